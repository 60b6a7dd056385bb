use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{ImageSlot, NewUser, User};

const USER_COLUMNS: &str = "id, username, email, fullname, password_hash, avatar_url, \
     cover_image_url, refresh_token, reset_token, reset_token_expiry, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username or email already taken")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Backend(e.into()),
        }
    }
}

/// Durable user records. Every call is a single-row operation.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Matches a user whose username equals `username` OR whose email equals
    /// `email`. A `None` side never matches.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>>;

    async fn find_by_reset_token(&self, token: &str) -> anyhow::Result<Option<User>>;

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<()>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;

    /// Stores the new hash and clears the reset token and the refresh token,
    /// only while `reset_token` is still the stored token. Returns `false`
    /// when another reset consumed it first.
    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_token: &str,
        password_hash: &str,
    ) -> anyhow::Result<bool>;

    /// `None` clears both the token and its expiry.
    async fn set_reset_token(
        &self,
        id: Uuid,
        reset: Option<(&str, OffsetDateTime)>,
    ) -> anyhow::Result<()>;

    async fn update_details(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn set_image_url(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> anyhow::Result<Option<User>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, username, email, fullname, password_hash, avatar_url, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.fullname)
        .bind(&new_user.password_hash)
        .bind(&new_user.avatar_url)
        .bind(&new_user.cover_image_url)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        reset_token: &str,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_token = NULL,
                reset_token_expiry = NULL,
                refresh_token = NULL,
                updated_at = now()
            WHERE id = $1 AND reset_token = $3
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(reset_token)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        reset: Option<(&str, OffsetDateTime)>,
    ) -> anyhow::Result<()> {
        let (token, expiry) = match reset {
            Some((token, expiry)) => (Some(token), Some(expiry)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expiry = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expiry)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update_details(
        &self,
        id: Uuid,
        fullname: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET fullname = $2, email = $3, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fullname)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_image_url(
        &self,
        id: Uuid,
        slot: ImageSlot,
        url: &str,
    ) -> anyhow::Result<Option<User>> {
        let column = match slot {
            ImageSlot::Avatar => "avatar_url",
            ImageSlot::CoverImage => "cover_image_url",
        };
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET {column} = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}
