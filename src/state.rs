use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cancel::StopRegistry;
use crate::core::config::{AppPaths, Settings};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{IndexManager, QaPipeline};
use crate::sessions::SessionStore;

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Settings,
    pub provider: Arc<dyn LlmProvider>,
    pub sessions: SessionStore,
    pub indexes: Arc<IndexManager>,
    pub pipeline: QaPipeline,
    pub stops: StopRegistry,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let settings = Settings::load(&paths);
        Self::with_parts(paths, settings, None)
    }

    /// Build state from explicit parts; tests inject their own paths,
    /// settings, and provider here.
    pub fn with_parts(
        paths: Arc<AppPaths>,
        settings: Settings,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> anyhow::Result<Arc<Self>> {
        let provider =
            provider.unwrap_or_else(|| Arc::new(OpenAiProvider::new(&settings.provider)));
        let sessions = SessionStore::new(&paths)?;
        let indexes = Arc::new(IndexManager::new(
            paths.vector_store_dir.clone(),
            settings.index_scope,
        ));
        let pipeline = QaPipeline::new(provider.clone(), indexes.clone(), &settings);
        let stops = StopRegistry::new();
        let started_at = Utc::now();

        Ok(Arc::new(AppState {
            paths,
            settings,
            provider,
            sessions,
            indexes,
            pipeline,
            stops,
            started_at,
        }))
    }
}
