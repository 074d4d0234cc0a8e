//! services/generator/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `SeriesRepository` and `SessionRepository` ports from the core crate. It
//! handles all interactions with the SQLite database using `sqlx`.
//!
//! Every batch write happens in one transaction: the stored series is loaded,
//! folded through the merge rule and written back, so a batch is either fully
//! durable or not stored at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devotional_core::ports::{PortError, PortResult, SeriesRepository, SessionRepository};
use devotional_core::{Day, GenerationContext, GenerationSession, Series, SessionStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// A private in-memory database. Pinned to one connection that never
    /// expires, since every SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(err: impl std::fmt::Display) -> PortError {
    PortError::Unexpected(err.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SeriesRecord {
    id: String,
    title: String,
    total_days: i64,
    current_day: i64,
    context: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SeriesRecord {
    fn to_domain(self, days: Vec<Day>) -> PortResult<Series> {
        let context: GenerationContext = serde_json::from_str(&self.context).map_err(unexpected)?;
        Ok(Series {
            id: Uuid::parse_str(&self.id).map_err(unexpected)?,
            title: self.title,
            total_days: self.total_days as u32,
            current_day: self.current_day as u32,
            context,
            days,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DayRecord {
    day_number: i64,
    content: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
}
impl DayRecord {
    fn to_domain(self) -> PortResult<Day> {
        let mut day: Day = serde_json::from_str(&self.content).map_err(unexpected)?;
        // The columns, not the JSON, are authoritative for numbering and read state.
        day.day_number = self.day_number as u32;
        day.is_read = self.is_read;
        day.read_at = self.read_at;
        Ok(day)
    }
}

#[derive(FromRow)]
struct SessionRecord {
    series_id: String,
    status: String,
    total_days: i64,
    generated_days: String,
    title: Option<String>,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<GenerationSession> {
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown session status '{}'", self.status)))?;
        Ok(GenerationSession {
            series_id: Uuid::parse_str(&self.series_id).map_err(unexpected)?,
            status,
            total_days: self.total_days as u32,
            generated_days: serde_json::from_str(&self.generated_days).map_err(unexpected)?,
            title: self.title,
            last_error: self.last_error,
            started_at: self.started_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// Shared Queries
//=========================================================================================

async fn load_series(conn: &mut SqliteConnection, series_id: Uuid) -> PortResult<Series> {
    let record = sqlx::query_as::<_, SeriesRecord>(
        "SELECT id, title, total_days, current_day, context, created_at, updated_at FROM series WHERE id = ?",
    )
    .bind(series_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(unexpected)?
    .ok_or_else(|| PortError::NotFound(format!("Series {} not found", series_id)))?;

    let days = sqlx::query_as::<_, DayRecord>(
        "SELECT day_number, content, is_read, read_at FROM days WHERE series_id = ? ORDER BY day_number",
    )
    .bind(series_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .map_err(unexpected)?
    .into_iter()
    .map(DayRecord::to_domain)
    .collect::<PortResult<Vec<_>>>()?;

    record.to_domain(days)
}

async fn write_series_row(conn: &mut SqliteConnection, series: &Series) -> PortResult<()> {
    sqlx::query("UPDATE series SET title = ?, total_days = ?, current_day = ?, updated_at = ? WHERE id = ?")
        .bind(&series.title)
        .bind(series.total_days as i64)
        .bind(series.current_day as i64)
        .bind(series.updated_at)
        .bind(series.id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(unexpected)?;
    Ok(())
}

async fn upsert_day(conn: &mut SqliteConnection, series_id: Uuid, day: &Day) -> PortResult<()> {
    let content = serde_json::to_string(day).map_err(unexpected)?;
    sqlx::query(
        "INSERT INTO days (series_id, day_number, content, is_read, read_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (series_id, day_number) DO UPDATE SET \
         content = excluded.content, is_read = excluded.is_read, read_at = excluded.read_at",
    )
    .bind(series_id.to_string())
    .bind(day.day_number as i64)
    .bind(content)
    .bind(day.is_read)
    .bind(day.read_at)
    .execute(&mut *conn)
    .await
    .map_err(unexpected)?;
    Ok(())
}

//=========================================================================================
// `SeriesRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl SeriesRepository for SqliteStore {
    async fn create_series(&self, series: &Series) -> PortResult<()> {
        let context = serde_json::to_string(&series.context).map_err(unexpected)?;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO series (id, title, total_days, current_day, context, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(series.id.to_string())
        .bind(&series.title)
        .bind(series.total_days as i64)
        .bind(series.current_day as i64)
        .bind(context)
        .bind(series.created_at)
        .bind(series.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        for day in &series.days {
            upsert_day(&mut tx, series.id, day).await?;
        }
        tx.commit().await.map_err(unexpected)
    }

    async fn get_series(&self, series_id: Uuid) -> PortResult<Series> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        load_series(&mut conn, series_id).await
    }

    async fn save_batch(
        &self,
        series_id: Uuid,
        title: Option<&str>,
        days: Vec<Day>,
        requested_total: Option<u32>,
    ) -> PortResult<Series> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut series = load_series(&mut tx, series_id).await?;

        if let Some(title) = title {
            series.title = title.to_string();
        }
        if let Some(total) = requested_total {
            series.raise_total(total);
        }
        series.apply_batch(days, Utc::now());

        write_series_row(&mut tx, &series).await?;
        for day in &series.days {
            upsert_day(&mut tx, series_id, day).await?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(series)
    }

    async fn mark_read(&self, series_id: Uuid, day_number: u32, at: DateTime<Utc>) -> PortResult<Day> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut series = load_series(&mut tx, series_id).await?;

        let day = series
            .mark_read(day_number, at)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Day {} of series {} not found", day_number, series_id)))?;

        write_series_row(&mut tx, &series).await?;
        upsert_day(&mut tx, series_id, &day).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(day)
    }
}

//=========================================================================================
// `SessionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionRepository for SqliteStore {
    async fn get_session(&self, series_id: Uuid) -> PortResult<Option<GenerationSession>> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT series_id, status, total_days, generated_days, title, last_error, started_at, updated_at \
             FROM generation_sessions WHERE series_id = ?",
        )
        .bind(series_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(SessionRecord::to_domain)
        .transpose()
    }

    async fn save_session(&self, session: &GenerationSession) -> PortResult<()> {
        let generated_days = serde_json::to_string(&session.generated_days).map_err(unexpected)?;
        sqlx::query(
            "INSERT INTO generation_sessions \
             (series_id, status, total_days, generated_days, title, last_error, started_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (series_id) DO UPDATE SET \
             status = excluded.status, total_days = excluded.total_days, \
             generated_days = excluded.generated_days, title = excluded.title, \
             last_error = excluded.last_error, started_at = excluded.started_at, \
             updated_at = excluded.updated_at",
        )
        .bind(session.series_id.to_string())
        .bind(session.status.as_str())
        .bind(session.total_days as i64)
        .bind(generated_days)
        .bind(&session.title)
        .bind(&session.last_error)
        .bind(session.started_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn clear_session(&self, series_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM generation_sessions WHERE series_id = ?")
            .bind(series_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn running_sessions(&self) -> PortResult<Vec<GenerationSession>> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT series_id, status, total_days, generated_days, title, last_error, started_at, updated_at \
             FROM generation_sessions WHERE status = ?",
        )
        .bind(SessionStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(SessionRecord::to_domain)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devotional_core::{DayDuration, RequesterProfile, SeriesLength};

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn series() -> Series {
        let context = GenerationContext {
            requester: RequesterProfile {
                name: "Ada".to_string(),
                life_season: Some("New parent".to_string()),
                story: None,
                prayer_focus: Some("Patience".to_string()),
            },
            series_length: SeriesLength::Seven,
            day_duration: DayDuration::FifteenMinutes,
            translation: "ESV".to_string(),
            theme: Some("Rest".to_string()),
            devotional_type: None,
            subject: None,
            avoid_references: vec!["John 3:16".to_string()],
        };
        Series::new(Uuid::new_v4(), context, Utc::now())
    }

    #[tokio::test]
    async fn test_series_round_trips_through_storage() {
        let store = store().await;
        let series = series();
        store.create_series(&series).await.unwrap();

        let loaded = store.get_series(series.id).await.unwrap();
        assert_eq!(loaded.id, series.id);
        assert_eq!(loaded.context, series.context);
        assert_eq!(loaded.total_days, 7);
        assert!(loaded.days.is_empty());
    }

    #[tokio::test]
    async fn test_save_batch_merges_without_losing_read_state() {
        let store = store().await;
        let series = series();
        store.create_series(&series).await.unwrap();

        let mut first = Day::new(1, "Rest", "Matt 11:28", "Come to me.");
        first.reflection_prompts = vec!["Where are you weary?".to_string()];
        store.save_batch(series.id, Some("Held"), vec![first], None).await.unwrap();
        let read = store.mark_read(series.id, 1, Utc::now()).await.unwrap();
        assert!(read.is_read);

        let stored = store
            .save_batch(
                series.id,
                None,
                vec![
                    Day::new(1, "Rest, again", "Ps 23", "He leads me."),
                    Day::new(2, "Stillness", "Ps 46:10", "Be still."),
                    Day::new(3, "Trust", "Prov 3:5", "Trust in the Lord."),
                ],
                Some(14),
            )
            .await
            .unwrap();

        assert_eq!(stored.title, "Held");
        assert_eq!(stored.total_days, 14);
        assert_eq!(stored.current_day, 2);

        let loaded = store.get_series(series.id).await.unwrap();
        assert_eq!(loaded.days, stored.days);
        let numbers: Vec<u32> = loaded.days.iter().map(|d| d.day_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(loaded.days[0].is_read);
        assert_eq!(loaded.days[0].read_at, read.read_at);
        assert_eq!(loaded.days[0].title, "Rest, again");
    }

    #[tokio::test]
    async fn test_mark_read_missing_day_is_not_found() {
        let store = store().await;
        let series = series();
        store.create_series(&series).await.unwrap();

        let err = store.mark_read(series.id, 4, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        let err = store.get_series(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sessions_persist_and_list_running() {
        let store = store().await;
        let now = Utc::now();

        let mut running = GenerationSession::idle(Uuid::new_v4(), now);
        running.start(7, now).unwrap();
        running.record_progress([1, 2, 3, 4, 5], Some("Held"), now).unwrap();
        store.save_session(&running).await.unwrap();

        let mut done = GenerationSession::idle(Uuid::new_v4(), now);
        done.start(3, now).unwrap();
        done.complete(now).unwrap();
        store.save_session(&done).await.unwrap();

        let loaded = store.get_session(running.series_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Running);
        assert_eq!(loaded.generated_days, vec![1, 2, 3, 4, 5]);
        assert_eq!(loaded.title.as_deref(), Some("Held"));

        let listed = store.running_sessions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].series_id, running.series_id);

        store.clear_session(running.series_id).await.unwrap();
        assert!(store.get_session(running.series_id).await.unwrap().is_none());
    }
}
