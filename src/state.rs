use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;

use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::tokens::TokenIssuer;
use crate::config::AppConfig;
use crate::mail::{Mailer, SmtpMailer};
use crate::storage::{AssetStorage, S3Storage};

/// Process-wide handles, built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub mailer: Arc<dyn Mailer>,
    pub storage: Arc<dyn AssetStorage>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(config.collaborator_timeout)
            .connect(config.database_url.expose())
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migrations failed; continuing with existing schema");
        }

        let mailer = SmtpMailer::new(
            &config.mail,
            &config.app_base_url,
            config.collaborator_timeout,
        )?;
        let storage = S3Storage::new(&config.storage).await?;
        let tokens = TokenIssuer::new(&config.jwt);

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db)),
            Arc::new(mailer),
            Arc::new(storage),
            tokens,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        storage: Arc<dyn AssetStorage>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            config,
            users,
            tokens: Arc::new(tokens),
            mailer,
            storage,
        }
    }
}

impl FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}
