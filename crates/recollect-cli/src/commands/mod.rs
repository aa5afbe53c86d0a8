pub mod graph;
pub mod insight;
pub mod maintenance;
pub mod memory;
pub mod search;
pub mod stats;

pub use graph::GraphCommand;
pub use insight::InsightCommand;
pub use maintenance::MaintenanceCommand;
pub use memory::MemoryCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use std::sync::Arc;

use recollect::config::Config;
use recollect::gateway::{self, CapabilityGateway, DisabledGateway};
use recollect::memory::MemoryStore;
use uuid::Uuid;

use crate::error::{CliError, CliResult};

pub fn parse_id(id: &str) -> CliResult<Uuid> {
    Uuid::parse_str(id).map_err(|e| CliError::usage(format!("Invalid UUID '{id}': {e}")))
}

pub fn parse_ids(ids: &[String]) -> CliResult<Vec<Uuid>> {
    ids.iter().map(|id| parse_id(id)).collect()
}

/// Open the journaled store at `config.storage.data_dir`.
///
/// The capability gateway is only built when the command needs one; other
/// commands run against a disabled gateway so they work offline.
pub async fn open_store(config: &Config, with_gateway: bool) -> CliResult<MemoryStore> {
    let mut config = config.clone();
    config.storage.persist = true;

    let gateway: Arc<dyn CapabilityGateway> = if with_gateway {
        gateway::from_config(&config.gateway)
            .map_err(|e| CliError::usage(format!("Gateway setup failed: {e}")))?
    } else {
        Arc::new(DisabledGateway::new())
    };

    tracing::debug!(
        "Opening store at {} with {} gateway",
        config.storage.data_dir.display(),
        gateway.name()
    );
    Ok(MemoryStore::open(&config, gateway).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_ids(&[id.to_string()]).unwrap(), vec![id]);
        assert!(parse_id("nope").unwrap_err().0.contains("nope"));
    }

    #[tokio::test]
    async fn test_open_store_without_gateway_is_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.storage.persist = false;

        let store = open_store(&config, false).await.unwrap();
        assert!(store.is_persistent());
        assert!(store.is_empty().await);
    }
}
