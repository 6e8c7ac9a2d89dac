use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::BearerToken,
    config::AppConfig,
    error::AppError,
    models::trip::{parse_timestamp, NewTrip},
    services::trips::{TripPage, TripQuery},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips))
        .route("/trips/", get(list_trips))
        .route("/trips/:username", get(list_user_trips).post(create_trip))
        .route("/trips/:username/:id", get(get_trip).delete(delete_trip))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    start: Option<String>,
    size: Option<String>,
}

impl ListParams {
    fn into_query(self, config: &AppConfig) -> Result<TripQuery, AppError> {
        let limit = page_size(self.size.as_deref(), config);
        let mut query = TripQuery::new(limit);
        if let Some(start) = self.start {
            query = query.since(parse_timestamp(&start)?);
        }
        Ok(query)
    }
}

/// Non-numeric sizes fall back to the default page size.
fn page_size(raw: Option<&str>, config: &AppConfig) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(config.default_page_size)
        .clamp(0, config.max_page_size)
}

fn page_body(page: TripPage) -> Value {
    json!({
        "trips": page.trips,
        "total": page.total,
        "message": "found trips",
    })
}

async fn list_trips(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(params) = params?;
    let query = params.into_query(&state.config)?;
    let page = state.trips.list(&query).await?;
    Ok(Json(page_body(page)))
}

async fn list_user_trips(
    State(state): State<AppState>,
    username: Result<Path<String>, PathRejection>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(username) = username?;
    let Query(params) = params?;
    let query = params.into_query(&state.config)?.owned_by(&username);
    let page = state.trips.list(&query).await?;
    if page.total == 0 {
        return Err(AppError::NotFound(
            "user does not exist or has no trips".into(),
        ));
    }
    Ok(Json(page_body(page)))
}

async fn get_trip(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path((username, id)) = path?;
    let id = trip_id(&id)?;
    let trip = state
        .trips
        .get_one(&username, id)
        .await?
        .ok_or_else(|| AppError::NotFound("trip not found".into()))?;
    Ok(Json(json!({ "trip": trip, "message": "found trip" })))
}

async fn create_trip(
    State(state): State<AppState>,
    username: Result<Path<String>, PathRejection>,
    token: BearerToken,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Path(username) = username?;
    state.tokens.belongs_to(token.as_deref(), &username)?;
    let Json(payload) = payload?;

    let trip = NewTrip::from_payload(&username, payload)?;
    let trip = state.trips.create(trip).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "trip": trip, "message": "created trip" })),
    ))
}

/// Ownership is checked before the trip is looked up, so a stranger gets
/// 403 even for ids that do not exist.
async fn delete_trip(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    token: BearerToken,
) -> Result<StatusCode, AppError> {
    let Path((username, id)) = path?;
    state.tokens.belongs_to(token.as_deref(), &username)?;
    let id = trip_id(&id)?;
    state.trips.delete(&username, id).await?;
    Ok(StatusCode::OK)
}

fn trip_id(raw: &str) -> Result<i64, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound("trip not found".into()))
}
