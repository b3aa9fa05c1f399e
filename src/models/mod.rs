//! Request and Response models for the operational API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{InvalidateRequest, StatusQuery, UsageQuery};
pub use responses::{
    HealthResponse, InvalidateResponse, MonitorResponse, TagKeysResponse, TagListResponse,
    UsageReportResponse, UserUsageResponse,
};
