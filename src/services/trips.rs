use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    db::DbPool,
    error::AppError,
    models::trip::{format_timestamp, NewTrip, Trip},
};

const TRIP_COLUMNS: &str =
    "id, title, username, created_at, start, finish, public, description, complete";

/// Filter and page size for a listing.
#[derive(Debug, Clone)]
pub struct TripQuery {
    pub username: Option<String>,
    pub since: DateTime<Utc>,
    pub limit: i64,
}

impl TripQuery {
    pub fn new(limit: i64) -> Self {
        Self {
            username: None,
            // Unix epoch, i.e. no lower bound.
            since: DateTime::<Utc>::default(),
            limit,
        }
    }

    pub fn owned_by(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = since;
        self
    }
}

/// One page of trips plus the number of rows matching the filter.
#[derive(Debug, Clone)]
pub struct TripPage {
    pub trips: Vec<Trip>,
    pub total: i64,
}

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
}

impl TripService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Newest first, strictly after `query.since`. Equal timestamps fall back
    /// to the higher id first so pages are stable.
    pub async fn list(&self, query: &TripQuery) -> Result<TripPage, AppError> {
        let since = format_timestamp(&query.since);
        let limit = query.limit.max(0);
        debug!(
            username = query.username.as_deref(),
            since = %since,
            limit,
            "listing trips"
        );

        let trips: Vec<Trip> = sqlx::query_as(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips \
             WHERE created_at > ?1 AND (?2 IS NULL OR username = ?2) \
             ORDER BY created_at DESC, id DESC LIMIT ?3"
        ))
        .bind(&since)
        .bind(query.username.as_deref())
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM trips WHERE created_at > ?1 AND (?2 IS NULL OR username = ?2)",
        )
        .bind(&since)
        .bind(query.username.as_deref())
        .fetch_one(&self.db)
        .await?;

        Ok(TripPage { trips, total })
    }

    pub async fn get_one(&self, username: &str, id: i64) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1 AND username = ?2"
        ))
        .bind(id)
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(trip)
    }

    pub async fn create(&self, trip: NewTrip) -> Result<Trip, AppError> {
        let created: Trip = sqlx::query_as(&format!(
            "INSERT INTO trips (title, username, created_at, start, finish, public, description, complete) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING {TRIP_COLUMNS}"
        ))
        .bind(&trip.title)
        .bind(&trip.username)
        .bind(format_timestamp(&trip.created_at))
        .bind(&trip.start)
        .bind(&trip.finish)
        .bind(trip.public)
        .bind(&trip.description)
        .bind(trip.complete)
        .fetch_one(&self.db)
        .await?;

        info!(id = created.id, username = %created.username, "created trip");
        Ok(created)
    }

    /// Removes a trip owned by `username`. A trip id that exists under another
    /// owner is reported the same as a missing one.
    pub async fn delete(&self, username: &str, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = ?1 AND username = ?2")
            .bind(id)
            .bind(username)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("trip not found".into()));
        }

        info!(id, username, "deleted trip");
        Ok(())
    }
}
