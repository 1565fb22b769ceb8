//! Location sample repository backed by the location_samples table.

use chrono::{DateTime, Utc};
use domain::models::{NewLocationSample, SampleId, StoredSample};
use domain::ports::{SampleStore, StoreChange, StoreError};
use metrics::counter;
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::change_feed::ChangeFeed;
use crate::entities::LocationSampleEntity;
use crate::error::map_sqlx_error;
use crate::metrics::QueryTimer;

const SAMPLE_COLUMNS: &str = "id, user_id, lat, lng, timestamp, battery_level, speed, heading";

/// Sample store on PostgreSQL. Timestamps come from the database clock.
#[derive(Clone)]
pub struct PgSampleStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgSampleStore {
    pub fn new(pool: PgPool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SampleStore for PgSampleStore {
    async fn insert(&self, sample: NewLocationSample) -> Result<StoredSample, StoreError> {
        let timer = QueryTimer::new("insert_location_sample");
        let result = sqlx::query_as::<_, LocationSampleEntity>(&format!(
            r#"
            INSERT INTO location_samples (user_id, lat, lng, timestamp, battery_level, speed, heading)
            VALUES ($1, $2, $3, NOW(), $4, $5, $6)
            RETURNING {}
            "#,
            SAMPLE_COLUMNS
        ))
        .bind(sample.user_id)
        .bind(sample.lat)
        .bind(sample.lng)
        .bind(sample.battery_level)
        .bind(sample.speed)
        .bind(sample.heading)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        let entity = result.map_err(map_sqlx_error)?;
        counter!("location_samples_written_total").increment(1);
        Ok(entity.into())
    }

    async fn latest_for_user(&self, user_id: Uuid) -> Result<Option<StoredSample>, StoreError> {
        let timer = QueryTimer::new("latest_location_sample");
        let result = sqlx::query_as::<_, LocationSampleEntity>(&format!(
            r#"
            SELECT {}
            FROM location_samples
            WHERE user_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
            SAMPLE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(map_sqlx_error)?.map(Into::into))
    }

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredSample>, StoreError> {
        let timer = QueryTimer::new("recent_location_samples");
        let result = sqlx::query_as::<_, LocationSampleEntity>(&format!(
            r#"
            SELECT {}
            FROM location_samples
            WHERE user_id = $1 AND timestamp >= $2
            ORDER BY timestamp DESC, id DESC
            "#,
            SAMPLE_COLUMNS
        ))
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn all_for_user(&self, user_id: Uuid) -> Result<Vec<StoredSample>, StoreError> {
        let timer = QueryTimer::new("all_location_samples");
        let result = sqlx::query_as::<_, LocationSampleEntity>(&format!(
            "SELECT {} FROM location_samples WHERE user_id = $1",
            SAMPLE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn delete_sample(&self, id: SampleId) -> Result<(), StoreError> {
        let timer = QueryTimer::new("delete_location_sample");
        let result = sqlx::query("DELETE FROM location_samples WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("sample {}", id)));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.feed.subscribe_samples()
    }
}
