//! # seqlog Testkit
//!
//! Test utilities for seqlog.
//!
//! This crate provides:
//! - Temporary log fixtures
//! - Property-based test generators using proptest
//! - Failure injection and crash recovery harnesses
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seqlog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_log() {
//!     with_memory_log(|appender, _medium| {
//!         assert_eq!(appender.append(b"a").unwrap(), 0);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
