//! Common error handling utilities for Stagedoor
//!
//! Every crate in the workspace reports failures to HTTP clients with the
//! same body shape and the same stable error codes. This crate owns both so
//! the sync core and the server agree on them.
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, ApiErrorBody};
//!
//! let body = ApiErrorBody::new(codes::checkin::NOT_FOUND, "not_found", "Ticket not found");
//! assert_eq!(body.code, "CHECKIN_6001");
//! ```

pub mod codes;
pub mod types;

pub use types::*;
