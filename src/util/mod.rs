//! Utility functions for common operations.
//!
//! - **URL handling**: feed URL normalization (the store key) and validation
//! - **Text processing**: single-line titles and length-bounded status text
//!
//! # Examples
//!
//! ```
//! use feedbird::util::{compose_status, normalize_feed_url, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(normalize_feed_url(url.as_str()), "https://example.com/feed.xml");
//!
//! let status = compose_status("New post", Some("https://example.com/p/1"));
//! assert_eq!(status, "New post https://example.com/p/1");
//! ```

mod text;
mod url_validator;

pub use text::{clean_title, compose_status, truncate_chars, LINK_WEIGHT, MAX_STATUS_CHARS};
pub use url_validator::{normalize_feed_url, validate_feed_url, UrlValidationError};
