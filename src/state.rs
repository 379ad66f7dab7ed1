//! Application state shared by every connection: problem library, prompts,
//! OpenAI client, progress store handle, and the sync/identity settings.
//!
//! Per-user state (progress cache, active problem, chat) lives in each
//! WebSocket session, never here.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::catalog::Catalog;
use crate::config::{resolve_config, AppConfig, IdentityCfg, Prompts, StoreKind, SyncCfg};
use crate::domain::Problem;
use crate::openai::OpenAI;
use crate::store::{FsProgressStore, MemoryProgressStore, ProgressStore};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub store: Arc<dyn ProgressStore>,
    pub sync: SyncCfg,
    pub identity: IdentityCfg,
}

impl AppState {
    /// Build state from env: load config, build the library, pick the store, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = resolve_config();

        // Build optional OpenAI client (if API key present).
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "vericode_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
        } else {
            info!(target: "vericode_backend", "OpenAI disabled (no OPENAI_API_KEY). Oracles will answer with fallbacks.");
        }

        Self::from_config(cfg, openai)
    }

    pub fn from_config(cfg: AppConfig, openai: Option<OpenAI>) -> Self {
        let catalog = Catalog::new(&cfg.problems);

        let store: Arc<dyn ProgressStore> = match cfg.store.kind {
            StoreKind::Memory => {
                info!(target: "sync", "Progress store: in-memory (lost on restart)");
                Arc::new(MemoryProgressStore::new())
            }
            StoreKind::Fs => {
                info!(target: "sync", data_dir = %cfg.store.data_dir.display(), "Progress store: filesystem");
                Arc::new(FsProgressStore::new(cfg.store.data_dir.clone()))
            }
        };

        info!(target: "sync", debounce_ms = cfg.sync.debounce_ms, recent_limit = cfg.sync.recent_limit, "Sync settings");

        Self {
            catalog,
            openai,
            prompts: cfg.prompts,
            store,
            sync: cfg.sync,
            identity: cfg.identity,
        }
    }

    /// Swap the progress store (tests, embedding).
    #[cfg(test)]
    pub fn with_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = store;
        self
    }

    /// Library lookup by id.
    pub fn problem(&self, id: &str) -> Option<Problem> {
        self.catalog.get(id).cloned()
    }
}
