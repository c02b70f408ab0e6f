use std::sync::Arc;

use stagedoor_sync::{SyncConfig, SyncEngine, SyncResult};

/// Shared application state
#[derive(Clone, Debug)]
pub struct StagedoorServer {
    engine: Arc<SyncEngine>,
}

impl StagedoorServer {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Connect the database and build the engine from configuration
    pub async fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let engine = SyncEngine::connect(config).await?;
        Ok(Self::new(engine))
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }
}
