//! API Module
//!
//! Thin operational HTTP surface over the tag cache and the budget monitor.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats`, `POST /cache/invalidate`, `GET /cache/tags[/:tag]`
//! - `GET /budget/usage`, `GET /budget/users/:user_id/usage`
//! - `GET /budget/:service/status`, `GET|PUT /budget/:service/config`
//! - `POST /budget/monitor`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
