//! # Manifest Decoder
//!
//! Turns raw manifest bytes into target resource descriptors.
//!
//! ## Supported Formats
//!
//! - **YAML streams**: one or more documents separated by `---`
//! - **JSON**: a single object, or several objects concatenated
//!
//! Empty documents are skipped. A malformed document fails the whole call,
//! so a pass never applies a partially decoded file.

pub mod decoder;
pub mod types;

pub use decoder::{decode, DecodeError};
pub use types::{ResourceRef, TargetResource};
