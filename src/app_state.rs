use std::sync::Arc;
use crate::{
    config::Config,
    ent_framework::EntityStore,
    infrastructure::SqliteDatabase,
};

#[derive(Clone)]
pub struct AppState {
    pub store: EntityStore,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let database = SqliteDatabase::connect(&config.database.url).await?;

        let store = EntityStore::builder(Arc::new(database))
            .settings(config.store.clone())
            .cache_capacity(config.cache.capacity)
            .build();

        Ok(Self { store, config })
    }
}
