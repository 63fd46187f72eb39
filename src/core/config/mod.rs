mod paths;
mod settings;

pub use paths::AppPaths;
pub use settings::{
    CancellationSettings, ChunkingSettings, GenerationSettings, IndexScope, ProviderSettings,
    RetrievalSettings, Settings,
};
