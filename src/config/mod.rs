//! # Configuration
//!
//! Process-level configuration for the controller.
//!
//! - `controller.rs` - `ControllerConfig` loaded from environment variables
//! - `credentials.rs` - Access token resolution for the manifest source

mod controller;
mod credentials;

pub use controller::ControllerConfig;
pub use credentials::{CredentialError, Credentials};
