//! Wiring of the core services over SQLite and the configured backends.

use anyhow::Result;
use std::sync::Arc;

use shelfmark_core::catalog::CatalogClient;
use shelfmark_core::generation::{ChatBackend, ConstrainedGenerator};
use shelfmark_core::mapping::MappingCache;
use shelfmark_core::predict::Predictor;
use shelfmark_core::sync::SyncGate;
use shelfmark_core::validation::Validator;

use crate::catalog::create_catalog;
use crate::config::Config;
use crate::db;
use crate::llm::create_backend;
use crate::sqlite_store::SqliteStore;

/// Everything a request handler or CLI command needs.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<SqliteStore>,
    pub cache: Arc<MappingCache>,
    pub generator: Arc<ConstrainedGenerator>,
    pub predictor: Arc<Predictor>,
    pub validator: Arc<Validator>,
    pub gate: Arc<SyncGate>,
}

impl Services {
    /// Connect to the database and build services from configuration.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let backend = create_backend(&config.llm)?;
        let catalog = create_catalog(&config.catalog)?;
        Self::assemble(config, SqliteStore::new(pool), backend, catalog)
    }

    /// Build services from explicit collaborators.
    pub fn assemble(
        config: &Config,
        store: SqliteStore,
        backend: Arc<dyn ChatBackend>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let cache = Arc::new(MappingCache::new());
        let generator = Arc::new(ConstrainedGenerator::new(backend));

        let predictor = Arc::new(Predictor::new(
            store.clone(),
            cache.clone(),
            generator.clone(),
            config.predict.defaults(),
        ));
        let validator = Arc::new(Validator::new(
            store.clone(),
            catalog.clone(),
            config.validation.policy()?,
        ));
        let gate = Arc::new(SyncGate::new(validator.clone(), catalog, store.clone()));

        Ok(Self {
            store,
            cache,
            generator,
            predictor,
            validator,
            gate,
        })
    }

    /// Rebuild the mapping cache from the corpus table.
    pub async fn rebuild_mapping(&self) -> Result<()> {
        self.cache.rebuild(self.store.as_ref()).await?;
        Ok(())
    }
}
