//! Router tests over a stubbed engine.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use saffron_engine::Engine;
use saffron_server::build_app;
use saffron_store::MemoryStore;
use saffron_workflow::{StepDefinition, WorkflowDefinition};

fn engine_with_stub_scraper() -> Engine {
  let engine = Engine::new(Arc::new(MemoryStore::new()));
  engine
    .register(
      WorkflowDefinition::new("scraper").on_event("scraper:start").step(
        StepDefinition::new("start", |_ctx| async {
          Ok(json!({"techCrunchArticles": [], "googleNewsArticles": []}))
        }),
      ),
    )
    .unwrap();
  engine
}

async fn body_json(response: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
    .await
    .unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn welcome_route_greets() {
  let app = build_app(engine_with_stub_scraper());

  let response = app
    .oneshot(Request::get("/").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let body = body_json(response).await;
  assert_eq!(body["message"], "Welcome to the Saffron Scraper API!");
}

#[tokio::test]
async fn scrape_returns_a_message_id() {
  let engine = engine_with_stub_scraper();
  let app = build_app(engine.clone());

  let response = app
    .oneshot(Request::post("/scrape").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let body = body_json(response).await;
  let message_id = body["messageId"].as_str().unwrap().to_string();
  assert!(!message_id.is_empty());

  // The id resolves to a real run.
  engine.get_run(&message_id).await.unwrap();
}

#[tokio::test]
async fn scrape_without_a_registered_workflow_is_an_error() {
  let engine = Engine::new(Arc::new(MemoryStore::new()));
  let app = build_app(engine);

  let response = app
    .oneshot(Request::post("/scrape").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

  let body = body_json(response).await;
  assert!(
    body["error"]
      .as_str()
      .unwrap()
      .contains("no workflow registered")
  );
}

#[tokio::test]
async fn streaming_an_unknown_message_id_is_not_found() {
  let app = build_app(engine_with_stub_scraper());

  let response = app
    .oneshot(
      Request::get("/message/no-such-run")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finished_run_streams_a_result_frame() {
  let engine = engine_with_stub_scraper();

  let handle = engine.spawn_run("scraper:start", json!({})).await.unwrap();
  let run_id = handle.run_id().to_string();
  handle.result().await.unwrap();

  let app = build_app(engine);
  let response = app
    .oneshot(
      Request::get(format!("/message/{run_id}"))
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok()),
    Some("text/event-stream")
  );

  // The run is finished, so the stream is just the terminal frame and the
  // whole body can be read to the end.
  let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
    .await
    .unwrap();
  let body = String::from_utf8(bytes.to_vec()).unwrap();
  let frame = body
    .lines()
    .find_map(|line| line.strip_prefix("data: "))
    .unwrap();
  let frame: Value = serde_json::from_str(frame).unwrap();
  assert_eq!(frame["type"], "result");
  assert_eq!(frame["messageId"], run_id);
  assert_eq!(frame["payload"]["techCrunchArticles"], json!([]));
}
