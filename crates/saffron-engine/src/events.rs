//! Progress events and the per-run publish/subscribe bus.
//!
//! Events are published by the scheduler as steps start, finish, and fail,
//! and fanned out to live subscribers. Each run gets its own broadcast
//! channel and its own monotonically increasing sequence counter; the
//! channel is torn down right after the run's terminal event so nothing can
//! be published for a finished run.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default per-run buffer between the scheduler and a slow subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// An ordered notification of step or run state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
  pub run_id: String,
  /// Monotonically increasing per run, starting at 0; subscribers use it to
  /// detect gaps and ordering.
  pub seq: u64,
  pub kind: ProgressEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventKind {
  StepStarted {
    step: String,
  },

  StepCompleted {
    step: String,
    output: serde_json::Value,
  },

  StepFailed {
    step: String,
    message: String,
  },

  /// Terminal: the run succeeded with the aggregated terminal-step result.
  RunCompleted {
    result: serde_json::Value,
  },

  /// Terminal: the run failed; the message is human-readable.
  RunFailed {
    message: String,
  },
}

impl ProgressEventKind {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
  }
}

/// In-process fan-out of [`ProgressEvent`]s, keyed by run id.
///
/// Subscribers only see events published after they subscribe. Publishing
/// with no subscribers is a no-op send into the broadcast buffer; the
/// scheduler never observes subscriber presence.
pub struct EventBus {
  channels: Mutex<HashMap<String, RunChannel>>,
  capacity: usize,
}

struct RunChannel {
  tx: broadcast::Sender<ProgressEvent>,
  next_seq: u64,
}

impl EventBus {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      channels: Mutex::new(HashMap::new()),
      capacity,
    }
  }

  /// Open the channel for a run. Called once when the run is created, before
  /// the scheduler can publish anything for it.
  pub fn open(&self, run_id: &str) {
    let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
    channels.entry(run_id.to_string()).or_insert_with(|| RunChannel {
      tx: broadcast::channel(self.capacity).0,
      next_seq: 0,
    });
  }

  /// Publish an event for a run, assigning the next sequence number.
  ///
  /// A terminal event closes the run's channel; later publishes for the run
  /// are dropped, keeping every subscriber's stream finite.
  pub fn publish(&self, run_id: &str, kind: ProgressEventKind) {
    let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
    let Some(channel) = channels.get_mut(run_id) else {
      return;
    };

    let event = ProgressEvent {
      run_id: run_id.to_string(),
      seq: channel.next_seq,
      kind,
    };
    channel.next_seq += 1;

    let terminal = event.kind.is_terminal();
    // Ignore send errors: no active receivers is fine.
    let _ = channel.tx.send(event);

    if terminal {
      channels.remove(run_id);
    }
  }

  /// Subscribe to a run's events from this point onward.
  ///
  /// Returns `None` when the run has no open channel (already finished, or
  /// never created here).
  pub fn subscribe(&self, run_id: &str) -> Option<broadcast::Receiver<ProgressEvent>> {
    let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
    channels.get(run_id).map(|channel| channel.tx.subscribe())
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}
