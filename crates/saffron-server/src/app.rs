//! Router and request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use saffron_engine::{Engine, EngineError};

use crate::stream::message_stream;

/// Event triggered by `POST /scrape`.
const SCRAPE_EVENT: &str = "scraper:start";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub engine: Engine,
}

/// Build the HTTP application over an engine.
pub fn build_app(engine: Engine) -> Router {
  Router::new()
    .route("/", get(welcome))
    .route("/scrape", post(scrape))
    .route("/message/:message_id", get(message_stream))
    .layer(TraceLayer::new_for_http())
    .with_state(AppState { engine })
}

async fn welcome() -> Json<serde_json::Value> {
  Json(json!({"message": "Welcome to the Saffron Scraper API!"}))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeResponse {
  message_id: String,
}

/// Trigger a scraping run and return its id without waiting for it.
async fn scrape(State(state): State<AppState>) -> Result<Json<ScrapeResponse>, ApiError> {
  let run_id = state.engine.trigger(SCRAPE_EVENT, json!({})).await?;
  info!(run_id = %run_id, "started scraping workflow");
  Ok(Json(ScrapeResponse { message_id: run_id }))
}

/// Error envelope returned by every route.
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(json!({"error": self.message}))).into_response()
  }
}

impl From<EngineError> for ApiError {
  fn from(error: EngineError) -> Self {
    let status = if error.is_not_found() {
      StatusCode::NOT_FOUND
    } else if matches!(error, EngineError::ShutDown) {
      StatusCode::SERVICE_UNAVAILABLE
    } else {
      StatusCode::INTERNAL_SERVER_ERROR
    };
    Self {
      status,
      message: error.to_string(),
    }
  }
}
