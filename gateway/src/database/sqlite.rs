//! SQLite-backed `Store`, grounded on the teacher's `database::mod`
//! connection-pool setup (WAL mode, busy_timeout, `sqlx::migrate!`).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{Lease, Session, SessionId};
use crate::error::{Error, Result};

use super::store::{not_found, SessionMutator, Store};

const SESSION_KS: &str = "session";
const LEASE_KS: &str = "lease";
const IDEM_KS: &str = "idem";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(path)
            .map_err(|e| Error::Configuration(format!("invalid store path {path}: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .pragma("journal_mode", "WAL")
            .pragma("synchronous", "NORMAL")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await
            .map_err(Error::Store)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Configuration(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn get_raw(&self, keyspace: &str, key: &str) -> Result<Option<(String, i64)>> {
        let row = sqlx::query("SELECT value, version FROM kv_store WHERE keyspace = ? AND key = ?")
            .bind(keyspace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Store)?;

        Ok(row.map(|r| (r.get::<String, _>("value"), r.get::<i64, _>("version"))))
    }

    async fn put_raw(&self, keyspace: &str, key: &str, value: &str, expected_version: Option<i64>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let result = match expected_version {
            None => {
                sqlx::query(
                    "INSERT INTO kv_store (keyspace, key, value, version, updated_at) VALUES (?, ?, ?, 0, ?)
                     ON CONFLICT(keyspace, key) DO UPDATE SET value = excluded.value, version = kv_store.version + 1, updated_at = excluded.updated_at",
                )
                .bind(keyspace)
                .bind(key)
                .bind(value)
                .bind(&now)
                .execute(&self.pool)
                .await
            }
            Some(version) => {
                sqlx::query(
                    "UPDATE kv_store SET value = ?, version = version + 1, updated_at = ? WHERE keyspace = ? AND key = ? AND version = ?",
                )
                .bind(value)
                .bind(&now)
                .bind(keyspace)
                .bind(key)
                .bind(version)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(Error::Store)?;

        if expected_version.is_some() && result.rows_affected() == 0 {
            return Err(Error::Conflict(format!("version mismatch for {keyspace}/{key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        let value = serde_json::to_string(&session).map_err(Error::Serialization)?;
        self.put_raw(SESSION_KS, &session.id.to_string(), &value, None).await
    }

    async fn get_session(&self, id: SessionId) -> Result<Session> {
        let (value, _) = self
            .get_raw(SESSION_KS, &id.to_string())
            .await?
            .ok_or_else(|| not_found(id))?;
        serde_json::from_str(&value).map_err(Error::Serialization)
    }

    async fn update_session(&self, id: SessionId, mutator: SessionMutator) -> Result<Session> {
        // Bounded retry loop: read, mutate in memory, CAS write.
        for _ in 0..8 {
            let (value, version) = self
                .get_raw(SESSION_KS, &id.to_string())
                .await?
                .ok_or_else(|| not_found(id))?;
            let mut session: Session = serde_json::from_str(&value).map_err(Error::Serialization)?;
            mutator(&mut session)?;
            let new_value = serde_json::to_string(&session).map_err(Error::Serialization)?;

            match self.put_raw(SESSION_KS, &id.to_string(), &new_value, Some(version)).await {
                Ok(()) => return Ok(session),
                Err(Error::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict(format!("too much contention updating session {id}")))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query("SELECT value FROM kv_store WHERE keyspace = ?")
            .bind(SESSION_KS)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Store)?;

        rows.into_iter()
            .map(|r| serde_json::from_str(&r.get::<String, _>("value")).map_err(Error::Serialization))
            .collect()
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE keyspace = ? AND key = ?")
            .bind(SESSION_KS)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    async fn get_lease(&self, key: &str) -> Result<Option<Lease>> {
        match self.get_raw(LEASE_KS, key).await? {
            Some((value, _)) => Ok(Some(serde_json::from_str(&value).map_err(Error::Serialization)?)),
            None => Ok(None),
        }
    }

    async fn put_lease(&self, lease: Lease) -> Result<()> {
        let value = serde_json::to_string(&lease).map_err(Error::Serialization)?;
        self.put_raw(LEASE_KS, &lease.key.clone(), &value, None).await
    }

    async fn delete_lease(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE keyspace = ? AND key = ?")
            .bind(LEASE_KS)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    async fn delete_all_leases(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE keyspace = ?")
            .bind(LEASE_KS)
            .execute(&self.pool)
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    async fn try_acquire_lease(&self, key: &str, owner: &str, ttl_secs: u64) -> Result<Lease> {
        // `BEGIN IMMEDIATE` grabs the write lock up front, before the read,
        // so a second connection racing on the same key blocks at BEGIN
        // until this one commits instead of reading stale "no lease" state
        // and writing over it.
        let mut conn = self.pool.acquire().await.map_err(Error::Store)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(Error::Store)?;

        let result: Result<Lease> = async {
            let row = sqlx::query("SELECT value FROM kv_store WHERE keyspace = ? AND key = ?")
                .bind(LEASE_KS)
                .bind(key)
                .fetch_optional(&mut *conn)
                .await
                .map_err(Error::Store)?;

            let existing: Option<Lease> = row
                .map(|r| serde_json::from_str::<Lease>(&r.get::<String, _>("value")))
                .transpose()
                .map_err(Error::Serialization)?;

            let now = Utc::now();
            if let Some(existing) = &existing {
                if existing.owner == owner && !existing.is_expired(now) {
                    return Ok(existing.clone());
                }
                if !existing.is_expired(now) {
                    return Err(Error::LeaseBusy(key.to_string()));
                }
            }

            let generation = existing.map(|e| e.generation + 1).unwrap_or(1);
            let lease =
                Lease { key: key.to_string(), owner: owner.to_string(), acquired_at: now, ttl_seconds: ttl_secs, generation };
            let value = serde_json::to_string(&lease).map_err(Error::Serialization)?;
            let now_str = now.to_rfc3339();

            sqlx::query(
                "INSERT INTO kv_store (keyspace, key, value, version, updated_at) VALUES (?, ?, ?, 0, ?)
                 ON CONFLICT(keyspace, key) DO UPDATE SET value = excluded.value, version = kv_store.version + 1, updated_at = excluded.updated_at",
            )
            .bind(LEASE_KS)
            .bind(key)
            .bind(&value)
            .bind(&now_str)
            .execute(&mut *conn)
            .await
            .map_err(Error::Store)?;

            Ok(lease)
        }
        .await;

        match &result {
            Ok(_) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(Error::Store)?;
            }
            Err(_) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            }
        }
        result
    }

    async fn get_idem(&self, key: &str) -> Result<Option<SessionId>> {
        match self.get_raw(IDEM_KS, key).await? {
            Some((value, _)) => Ok(Some(
                SessionId::parse(&value).map_err(|e| Error::Internal(format!("corrupt idem record: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    async fn put_idem(&self, key: &str, session_id: SessionId) -> Result<()> {
        self.put_raw(IDEM_KS, key, &session_id.to_string(), None).await
    }
}
