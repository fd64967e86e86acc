//! Handle factory trait

use async_trait::async_trait;

use crate::error::CreationError;
use crate::types::{ConnectionOptions, Credentials, Endpoint};

/// Opens a channel to the service and performs the handshake.
///
/// The pool treats the produced handle as opaque. Each successful call
/// yields a new handle which the pool then shares between callers.
#[async_trait]
pub trait HandleFactory: Send + Sync + 'static {
    /// The client handle produced by this factory
    type Handle: Send + Sync + 'static;

    /// Create a new handle for the given identity
    async fn create(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        options: &ConnectionOptions,
    ) -> Result<Self::Handle, CreationError>;
}
