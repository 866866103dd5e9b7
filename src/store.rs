use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
};

use crate::config::{DbConfig, DbDriver};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// A stored prediction as returned by the history endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct PredictionRecord {
    pub id: i64,
    pub label: String,
    pub confidence: f64,
    pub timestamp: NaiveDateTime,
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn record(
        &self,
        label: &str,
        confidence: f64,
        timestamp: NaiveDateTime,
    ) -> Result<(), StoreError>;

    /// Every stored prediction, newest first.
    async fn list_all(&self) -> Result<Vec<PredictionRecord>, StoreError>;
}

pub async fn connect(config: &DbConfig) -> Result<Arc<dyn PredictionStore>, StoreError> {
    let store: Arc<dyn PredictionStore> = match config.driver {
        DbDriver::MySql => Arc::new(MySqlStore::connect(config).await?),
        DbDriver::Postgres => Arc::new(PgStore::connect(config).await?),
    };
    Ok(store)
}

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlStore { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Ok(MySqlStore::new(pool))
    }
}

#[async_trait]
impl PredictionStore for MySqlStore {
    async fn record(
        &self,
        label: &str,
        confidence: f64,
        timestamp: NaiveDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO predictions (label, confidence, `timestamp`) VALUES (?, ?, ?)")
            .bind(label)
            .bind(confidence)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PredictionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, PredictionRecord>(
            "SELECT CAST(id AS SIGNED) AS id, label, confidence, `timestamp` \
             FROM predictions ORDER BY `timestamp` DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Ok(PgStore::new(pool))
    }
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn record(
        &self,
        label: &str,
        confidence: f64,
        timestamp: NaiveDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(r#"INSERT INTO predictions (label, confidence, "timestamp") VALUES ($1, $2, $3)"#)
            .bind(label)
            .bind(confidence)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<PredictionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, PredictionRecord>(
            r#"SELECT CAST(id AS BIGINT) AS id, label, confidence, "timestamp"
               FROM predictions ORDER BY "timestamp" DESC, id DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn record_serializes_timestamp_as_iso_8601() {
        let record = PredictionRecord {
            id: 7,
            label: "Healthy".to_string(),
            confidence: 0.5,
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 17)
                .unwrap()
                .and_hms_opt(8, 30, 15)
                .unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({
                "id": 7,
                "label": "Healthy",
                "confidence": 0.5,
                "timestamp": "2024-05-17T08:30:15"
            })
        );
    }
}
