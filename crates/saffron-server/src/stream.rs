//! SSE streaming endpoint.
//!
//! `GET /message/{messageId}` subscribes to a run's progress events and
//! forwards each as one SSE frame:
//!
//! ```text
//! data: {"type": <type>, "payload": <payload>, "messageId": <runId>}
//! ```
//!
//! The stream ends after the terminal frame: `result` carries the aggregated
//! run result, `error` carries `{"message": <text>}`.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use saffron_engine::{ProgressEvent, ProgressEventKind};

use crate::app::{ApiError, AppState};

/// One SSE frame, shaped the way stream consumers expect.
#[derive(Debug, Serialize)]
struct StreamMessage {
  #[serde(rename = "type")]
  kind: &'static str,
  payload: serde_json::Value,
  #[serde(rename = "messageId")]
  message_id: String,
}

impl From<ProgressEvent> for StreamMessage {
  fn from(event: ProgressEvent) -> Self {
    let (kind, payload) = match event.kind {
      ProgressEventKind::StepStarted { step } => ("step_started", json!({"step": step})),
      ProgressEventKind::StepCompleted { output, .. } => ("step_completed", output),
      ProgressEventKind::StepFailed { step, message } => {
        ("step_failed", json!({"step": step, "message": message}))
      }
      ProgressEventKind::RunCompleted { result } => ("result", result),
      ProgressEventKind::RunFailed { message } => ("error", json!({"message": message})),
    };
    Self {
      kind,
      payload,
      message_id: event.run_id,
    }
  }
}

/// Stream a run's progress as server-sent events.
pub async fn message_stream(
  State(state): State<AppState>,
  Path(message_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
  let events = state.engine.subscribe(&message_id).await?;
  let frames = events.map(|event| Ok(sse_frame(event)));
  Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn sse_frame(event: ProgressEvent) -> Event {
  match Event::default().json_data(StreamMessage::from(event)) {
    Ok(frame) => frame,
    Err(_) => Event::default().data("{}"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn result_frame_carries_the_run_result() {
    let message = StreamMessage::from(ProgressEvent {
      run_id: "run-1".into(),
      seq: 4,
      kind: ProgressEventKind::RunCompleted {
        result: json!({"techCrunchArticles": {"articles": []}}),
      },
    });

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["type"], "result");
    assert_eq!(value["messageId"], "run-1");
    assert_eq!(value["payload"]["techCrunchArticles"]["articles"], json!([]));
  }

  #[test]
  fn error_frame_carries_a_message_object() {
    let message = StreamMessage::from(ProgressEvent {
      run_id: "run-1".into(),
      seq: 2,
      kind: ProgressEventKind::RunFailed {
        message: "step 'parse_articles' failed: invalid step output format".into(),
      },
    });

    let value = serde_json::to_value(&message).unwrap();
    assert_eq!(value["type"], "error");
    assert!(
      value["payload"]["message"]
        .as_str()
        .unwrap()
        .contains("invalid step output format")
    );
  }

  #[test]
  fn step_frames_name_the_step() {
    let started = StreamMessage::from(ProgressEvent {
      run_id: "run-1".into(),
      seq: 0,
      kind: ProgressEventKind::StepStarted {
        step: "fetch_homepage".into(),
      },
    });
    let value = serde_json::to_value(&started).unwrap();
    assert_eq!(value["type"], "step_started");
    assert_eq!(value["payload"]["step"], "fetch_homepage");

    let completed = StreamMessage::from(ProgressEvent {
      run_id: "run-1".into(),
      seq: 1,
      kind: ProgressEventKind::StepCompleted {
        step: "fetch_homepage".into(),
        output: json!({"status": "success"}),
      },
    });
    let value = serde_json::to_value(&completed).unwrap();
    assert_eq!(value["type"], "step_completed");
    assert_eq!(value["payload"]["status"], "success");
  }
}
