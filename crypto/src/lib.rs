//! Cryptographic helpers for Stagedoor
//!
//! Small, dependency-light primitives used to sign and verify sync tokens:
//!
//! - HMAC-SHA256 tags ([`mac`])
//! - Constant-time comparisons ([`constant_time`])
//! - Random nonces ([`random`])
//!
//! # Example
//!
//! ```rust
//! use crypto::mac::{hmac_sha256, verify_hmac_sha256};
//!
//! let tag = hmac_sha256(b"server-secret", b"payload").unwrap();
//! assert!(verify_hmac_sha256(b"server-secret", b"payload", &tag).unwrap());
//! ```

pub mod constant_time;
pub mod error;
pub mod mac;
pub mod random;

pub use error::*;
