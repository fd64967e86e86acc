//! chanpool-core: Core types and configuration for chanpool
//!
//! This crate provides the identity key types, error types, configuration
//! structures and collaborator traits used by the pooling engine.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConfigError, CreationError, EndpointError};
pub use traits::{ChannelCountSource, FixedChannelCount, HandleFactory};
pub use types::{ConnectionOptions, ConnectionParams, Credentials, Endpoint, IdentityKey};
