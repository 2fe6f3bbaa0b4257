use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{ApiId, SessionHash, UserId, DEFAULT_AUTHORIZATION_TTL_DAYS};

const AUTHORIZATION_COLUMNS: &str = "hash, user_id, auth_key, password_pending, \
     call_requests_disabled, api_id, app_name, app_version, device_model, platform, \
     system_version, ip, country, region, date_created, date_active";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAuthorization {
    pub api_id: ApiId,
    pub app_name: String,
    pub app_version: String,
    pub device_model: String,
    pub platform: String,
    pub system_version: String,
    pub ip: String,
    pub country: String,
    pub region: String,
    pub password_pending: bool,
}

#[derive(Debug, Clone)]
pub struct StoredAuthorization {
    pub hash: SessionHash,
    pub user_id: UserId,
    pub auth_key: String,
    pub password_pending: bool,
    pub call_requests_disabled: bool,
    pub api_id: ApiId,
    pub app_name: String,
    pub app_version: String,
    pub device_model: String,
    pub platform: String,
    pub system_version: String,
    pub ip: String,
    pub country: String,
    pub region: String,
    pub date_created: i64,
    pub date_active: i64,
}

impl StoredAuthorization {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            hash: SessionHash(row.get::<i64, _>("hash") as u64),
            user_id: UserId(row.get::<i64, _>("user_id")),
            auth_key: row.get("auth_key"),
            password_pending: row.get("password_pending"),
            call_requests_disabled: row.get("call_requests_disabled"),
            api_id: ApiId(row.get::<i32, _>("api_id")),
            app_name: row.get("app_name"),
            app_version: row.get("app_version"),
            device_model: row.get("device_model"),
            platform: row.get("platform"),
            system_version: row.get("system_version"),
            ip: row.get("ip"),
            country: row.get("country"),
            region: row.get("region"),
            date_created: row.get("date_created"),
            date_active: row.get("date_active"),
        }
    }
}

/// Hashes are positive and never zero so they survive the i64 column and
/// never collide with the "current session" marker.
fn generate_session_hash() -> SessionHash {
    let (high, _) = Uuid::new_v4().as_u64_pair();
    SessionHash((high >> 1).max(1))
}

fn generate_auth_key() -> String {
    Uuid::new_v4().simple().to_string()
}

fn hash_column(hash: SessionHash) -> i64 {
    hash.0 as i64
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username) VALUES (?)
             ON CONFLICT(username) DO UPDATE SET username=excluded.username
             RETURNING id",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn create_authorization(
        &self,
        user_id: UserId,
        new: &NewAuthorization,
        now: i64,
    ) -> Result<StoredAuthorization> {
        let hash = generate_session_hash();
        let auth_key = generate_auth_key();
        sqlx::query(
            "INSERT INTO authorizations (
                hash, user_id, auth_key, password_pending, call_requests_disabled, api_id,
                app_name, app_version, device_model, platform, system_version,
                ip, country, region, date_created, date_active
             ) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(hash_column(hash))
        .bind(user_id.0)
        .bind(&auth_key)
        .bind(new.password_pending)
        .bind(new.api_id.0)
        .bind(&new.app_name)
        .bind(&new.app_version)
        .bind(&new.device_model)
        .bind(&new.platform)
        .bind(&new.system_version)
        .bind(&new.ip)
        .bind(&new.country)
        .bind(&new.region)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert authorization")?;

        self.authorization_by_key(&auth_key)
            .await?
            .context("authorization missing right after insert")
    }

    pub async fn authorization_by_key(&self, auth_key: &str) -> Result<Option<StoredAuthorization>> {
        let row = sqlx::query(&format!(
            "SELECT {AUTHORIZATION_COLUMNS} FROM authorizations WHERE auth_key = ?"
        ))
        .bind(auth_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(StoredAuthorization::from_row))
    }

    pub async fn list_authorizations(&self, user_id: UserId) -> Result<Vec<StoredAuthorization>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUTHORIZATION_COLUMNS} FROM authorizations
             WHERE user_id = ?
             ORDER BY date_created ASC, hash ASC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(StoredAuthorization::from_row).collect())
    }

    pub async fn touch_authorization(&self, hash: SessionHash, ip: &str, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE authorizations
             SET date_active = ?, ip = CASE WHEN ? = '' THEN ip ELSE ? END
             WHERE hash = ?",
        )
        .bind(now)
        .bind(ip)
        .bind(ip)
        .bind(hash_column(hash))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns whether a row owned by `user_id` was removed.
    pub async fn delete_authorization(&self, user_id: UserId, hash: SessionHash) -> Result<bool> {
        let result = sqlx::query("DELETE FROM authorizations WHERE user_id = ? AND hash = ?")
            .bind(user_id.0)
            .bind(hash_column(hash))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every session of the user except `keep`; returns the count.
    pub async fn delete_other_authorizations(
        &self,
        user_id: UserId,
        keep: SessionHash,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM authorizations WHERE user_id = ? AND hash != ?")
            .bind(user_id.0)
            .bind(hash_column(keep))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_call_requests_disabled(
        &self,
        user_id: UserId,
        hash: SessionHash,
        disabled: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE authorizations SET call_requests_disabled = ? WHERE user_id = ? AND hash = ?",
        )
        .bind(disabled)
        .bind(user_id.0)
        .bind(hash_column(hash))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn ttl_days(&self, user_id: UserId) -> Result<i32> {
        let days: Option<i32> = sqlx::query_scalar(
            "SELECT authorization_ttl_days FROM account_settings WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(days.unwrap_or(DEFAULT_AUTHORIZATION_TTL_DAYS))
    }

    pub async fn set_ttl_days(&self, user_id: UserId, days: i32) -> Result<()> {
        sqlx::query(
            "INSERT INTO account_settings (user_id, authorization_ttl_days) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET authorization_ttl_days=excluded.authorization_ttl_days",
        )
        .bind(user_id.0)
        .bind(days)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops sessions that stayed inactive longer than their account's ttl.
    pub async fn delete_expired_authorizations(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM authorizations
             WHERE date_active + 86400 * COALESCE(
                 (SELECT s.authorization_ttl_days FROM account_settings s
                  WHERE s.user_id = authorizations.user_id),
                 ?
             ) < ?",
        )
        .bind(DEFAULT_AUTHORIZATION_TTL_DAYS)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
