//! Capability gateway
//!
//! Model-backed capabilities the engine calls but does not implement:
//! embedding, categorization, validation and reflection.

pub mod disabled;
pub mod hybrid;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod prompts;
pub mod provider;
pub mod remote;
pub mod types;

use std::sync::Arc;

use tracing::info;

pub use disabled::DisabledGateway;
pub use hybrid::HybridGateway;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use provider::CapabilityGateway;
pub use remote::RemoteGateway;
pub use types::{GatewayError, Validation};

use crate::config::GatewayConfig;

/// Build the configured provider.
///
/// `remote` uses an OpenAI-compatible API, `local` runs fastembed for
/// embeddings only, `hybrid` embeds locally and reasons remotely, `none`
/// disables every capability.
pub fn from_config(config: &GatewayConfig) -> types::Result<Arc<dyn CapabilityGateway>> {
    let gateway: Arc<dyn CapabilityGateway> = match config.provider.to_lowercase().as_str() {
        "remote" => Arc::new(RemoteGateway::new(&config.remote)?),
        "local" => local_embedder(config)?,
        "hybrid" => {
            let embedder = local_embedder(config)?;
            let reasoner = Arc::new(RemoteGateway::new(&config.remote)?);
            Arc::new(HybridGateway::new(embedder, reasoner))
        }
        "none" | "disabled" => Arc::new(DisabledGateway::new()),
        other => {
            return Err(GatewayError::Config(format!(
                "Unknown gateway provider '{other}' (expected remote, local, hybrid or none)"
            )));
        }
    };

    info!("Capability gateway: {}", gateway.name());
    Ok(gateway)
}

#[cfg(feature = "local-embeddings")]
fn local_embedder(config: &GatewayConfig) -> types::Result<Arc<dyn CapabilityGateway>> {
    Ok(Arc::new(LocalEmbedder::new(&config.local)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder(_config: &GatewayConfig) -> types::Result<Arc<dyn CapabilityGateway>> {
    Err(GatewayError::Config(
        "local embeddings require building with the 'local-embeddings' feature".to_string(),
    ))
}
