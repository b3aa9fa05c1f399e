//! Redis-style glob patterns for the in-memory backend.

use regex::Regex;

/// Compiled key pattern supporting `*`, `?`, `[...]` and `\` escapes.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob into an anchored regex.
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let mut out = String::with_capacity(glob.len() + 8);
        out.push('^');

        let mut chars = glob.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => out.push_str(".*"),
                '?' => out.push('.'),
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push_str(&regex::escape(&next.to_string()));
                    }
                }
                '[' => {
                    out.push('[');
                    if chars.peek() == Some(&'^') {
                        chars.next();
                        out.push('^');
                    }
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            break;
                        }
                        match inner {
                            '\\' | '[' | '&' | '~' => {
                                out.push('\\');
                                out.push(inner);
                            }
                            _ => out.push(inner),
                        }
                    }
                    out.push(']');
                }
                other => out.push_str(&regex::escape(&other.to_string())),
            }
        }

        out.push('$');
        Ok(Self {
            regex: Regex::new(&out)?,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_any_suffix() {
        let p = KeyPattern::new("post:*").unwrap();
        assert!(p.matches("post:1"));
        assert!(p.matches("post:1:meta"));
        assert!(!p.matches("posts:1"));
    }

    #[test]
    fn test_question_mark_matches_single_char() {
        let p = KeyPattern::new("user:?").unwrap();
        assert!(p.matches("user:7"));
        assert!(!p.matches("user:42"));
    }

    #[test]
    fn test_character_class() {
        let p = KeyPattern::new("event:[ab]").unwrap();
        assert!(p.matches("event:a"));
        assert!(!p.matches("event:c"));

        let p = KeyPattern::new("event:[^ab]").unwrap();
        assert!(p.matches("event:c"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = KeyPattern::new("search:a.b+c").unwrap();
        assert!(p.matches("search:a.b+c"));
        assert!(!p.matches("search:axbbc"));
    }
}
