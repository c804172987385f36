//! SQLite persistence for user profiles, daily nutrition logs and the
//! proxied food cache.
//!
//! Queries are small point lookups; they run on the blocking pool behind a
//! shared connection.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task;

use crate::error::{GatewayError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    email         TEXT UNIQUE,
    user_metadata TEXT,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_dates (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL,
    date           TEXT NOT NULL,
    meals          TEXT,
    notes          TEXT,
    water_intake   INTEGER NOT NULL DEFAULT 0,
    weight         REAL,
    day_aggregates TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (user_id, date)
);
CREATE TABLE IF NOT EXISTS food_cache (
    food_id    TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
";

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: Option<String>,
    pub user_metadata: Option<Value>,
    pub created_at: String,
}

/// Partial update for a user profile; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub user_metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayLog {
    pub user_id: i64,
    pub date: String,
    pub meals: Value,
    pub notes: String,
    pub water_intake: i64,
    pub weight: Option<f64>,
    pub day_aggregates: Value,
    pub updated_at: Option<String>,
}

impl DayLog {
    /// Empty structure returned for dates without data yet.
    pub fn empty(user_id: i64, date: &str) -> Self {
        Self {
            user_id,
            date: date.to_string(),
            meals: Value::Array(vec![]),
            notes: String::new(),
            water_intake: 0,
            weight: None,
            day_aggregates: Value::Object(Default::default()),
            updated_at: None,
        }
    }
}

/// Partial update for a day log; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayPatch {
    pub meals: Option<Value>,
    pub notes: Option<String>,
    pub water_intake: Option<i64>,
    pub weight: Option<f64>,
    pub day_aggregates: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: String,
    pub has_meals: bool,
    pub has_notes: bool,
    pub water_intake: i64,
    pub weight: Option<f64>,
    pub day_aggregates: Value,
    pub updated_at: Option<String>,
}

/// Cheaply cloneable handle over one SQLite connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| GatewayError::Storage("database mutex poisoned".to_string()))?;
            op(&guard)
        })
        .await
        .map_err(|e| GatewayError::Storage(format!("blocking task failed: {e}")))?
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT id, email, user_metadata, created_at FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        user_metadata: parse_json_opt(row.get::<_, Option<String>>(2)?),
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    pub async fn upsert_user(&self, user_id: i64, patch: UserPatch) -> Result<()> {
        self.blocking(move |conn| {
            let now = Utc::now().to_rfc3339();
            let metadata = patch
                .user_metadata
                .as_ref()
                .map(|v| v.to_string());
            conn.execute(
                "INSERT INTO users (id, email, user_metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                     email         = COALESCE(?2, users.email),
                     user_metadata = COALESCE(?3, users.user_metadata)",
                params![user_id, patch.email, metadata, now],
            )?;
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Daily logs
    // ------------------------------------------------------------------

    pub async fn get_day(&self, user_id: i64, date: &str) -> Result<Option<DayLog>> {
        let date = date.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT meals, notes, water_intake, weight, day_aggregates, updated_at
                 FROM user_dates WHERE user_id = ?1 AND date = ?2",
                params![user_id, date],
                |row| {
                    Ok(DayLog {
                        user_id,
                        date: date.clone(),
                        meals: parse_json_opt(row.get::<_, Option<String>>(0)?)
                            .unwrap_or(Value::Array(vec![])),
                        notes: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        water_intake: row.get(2)?,
                        weight: row.get(3)?,
                        day_aggregates: parse_json_opt(row.get::<_, Option<String>>(4)?)
                            .unwrap_or(Value::Object(Default::default())),
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    /// Read-merge-write under the connection lock; only fields present in
    /// the patch overwrite stored values.
    pub async fn upsert_day(&self, user_id: i64, date: &str, patch: DayPatch) -> Result<()> {
        let date = date.to_string();
        self.blocking(move |conn| {
            let existing = conn
                .query_row(
                    "SELECT meals, notes, water_intake, weight, day_aggregates
                     FROM user_dates WHERE user_id = ?1 AND date = ?2",
                    params![user_id, &date],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;

            let (meals, notes, water, weight, aggregates) =
                existing.unwrap_or((None, None, 0, None, None));

            let meals = patch
                .meals
                .as_ref()
                .map(|v| v.to_string())
                .or(meals);
            let notes = patch.notes.or(notes);
            let water = patch.water_intake.unwrap_or(water);
            let weight = patch.weight.or(weight);
            let aggregates = patch
                .day_aggregates
                .as_ref()
                .map(|v| v.to_string())
                .or(aggregates);

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO user_dates
                     (user_id, date, meals, notes, water_intake, weight, day_aggregates,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT (user_id, date) DO UPDATE SET
                     meals          = ?3,
                     notes          = ?4,
                     water_intake   = ?5,
                     weight         = ?6,
                     day_aggregates = ?7,
                     updated_at     = ?8",
                params![user_id, date, meals, notes, water, weight, aggregates, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_days(
        &self,
        user_id: i64,
        start_date: Option<String>,
        end_date: Option<String>,
        limit: i64,
    ) -> Result<Vec<DaySummary>> {
        self.blocking(move |conn| {
            let mut sql = String::from(
                "SELECT date, meals, notes, water_intake, weight, day_aggregates, updated_at
                 FROM user_dates WHERE user_id = ?",
            );
            let mut values: Vec<SqlValue> = vec![SqlValue::Integer(user_id)];
            if let Some(start) = start_date {
                sql.push_str(" AND date >= ?");
                values.push(SqlValue::Text(start));
            }
            if let Some(end) = end_date {
                sql.push_str(" AND date <= ?");
                values.push(SqlValue::Text(end));
            }
            sql.push_str(" ORDER BY date DESC LIMIT ?");
            values.push(SqlValue::Integer(limit));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
                let meals = row.get::<_, Option<String>>(1)?;
                let notes = row.get::<_, Option<String>>(2)?;
                Ok(DaySummary {
                    date: row.get(0)?,
                    has_meals: matches!(
                        parse_json_opt(meals),
                        Some(Value::Array(ref items)) if !items.is_empty()
                    ),
                    has_notes: notes.map(|n| !n.is_empty()).unwrap_or(false),
                    water_intake: row.get(3)?,
                    weight: row.get(4)?,
                    day_aggregates: parse_json_opt(row.get::<_, Option<String>>(5)?)
                        .unwrap_or(Value::Object(Default::default())),
                    updated_at: row.get(6)?,
                })
            })?;

            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row?);
            }
            Ok(summaries)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Food cache
    // ------------------------------------------------------------------

    /// Returns the cached upstream payload for a food only while it is
    /// still fresh.
    pub async fn get_cached_food(&self, food_id: &str) -> Result<Option<Value>> {
        let food_id = food_id.to_string();
        self.blocking(move |conn| {
            let now = Utc::now().timestamp();
            conn.query_row(
                "SELECT data FROM food_cache WHERE food_id = ?1 AND expires_at > ?2",
                params![food_id, now],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|data| {
                serde_json::from_str(&data)
                    .map_err(|e| GatewayError::Storage(format!("corrupt cached food: {e}")))
            })
            .transpose()
        })
        .await
    }

    pub async fn put_cached_food(&self, food_id: &str, data: &Value, ttl_secs: i64) -> Result<()> {
        let food_id = food_id.to_string();
        let data = data.to_string();
        self.blocking(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO food_cache (food_id, data, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (food_id) DO UPDATE SET
                     data       = ?2,
                     expires_at = ?3",
                params![food_id, data, now.timestamp() + ttl_secs, now.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}

fn parse_json_opt(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}
