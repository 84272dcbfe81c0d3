use std::sync::Arc;

use anyhow::Result;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::bb8::Pool;
use reqwest::Client;

use crate::{config::Config, db};

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Pool<AsyncPgConnection>,
    pub http_client: Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn init(config: Config) -> Result<Self> {
        let db_pool = db::init_pool(&config.database.url).await?;

        Ok(Self {
            db_pool,
            http_client: Client::new(),
            config: Arc::new(config),
        })
    }
}
