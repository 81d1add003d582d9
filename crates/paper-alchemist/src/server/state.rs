//! Application state for the HTTP server

use std::sync::Arc;

use crate::config::AlchemistConfig;
use crate::error::Result;
use crate::processing::Pipeline;
use crate::storage::DocumentRepository;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AlchemistConfig,
    pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Open the database and wire the configured collaborators
    pub fn new(config: AlchemistConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");
        let pipeline = Arc::new(Pipeline::open(&config)?);
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// State around an already built pipeline
    pub fn with_pipeline(config: AlchemistConfig, pipeline: Arc<Pipeline>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pipeline,
            }),
        }
    }

    pub fn config(&self) -> &AlchemistConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.inner.pipeline
    }

    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        self.inner.pipeline.repository()
    }
}
