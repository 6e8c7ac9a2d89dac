use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status() -> Json<Value> {
    Json(json!({
        "status": 200,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
