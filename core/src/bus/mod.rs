//! Streaming event bus.
//!
//! One bus per run: an unbounded FIFO of [`StreamingData`] plus a completion
//! flag. Producers hold a cloneable [`EventSink`]; the HTTP layer drains the
//! single [`EventStream`]. The stream always yields queued items before it
//! honours the completion flag, so nothing pushed before `finish` is lost.

mod guard;

pub use guard::{TIMEOUT_MESSAGE, report_error};

use std::sync::Arc;

use agentkit_protocol::{Metadata, StreamingData, StreamingDataType, StreamingSignal};
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};

/// Builds metadata from literal pairs.
pub fn metadata<const N: usize>(pairs: [(&str, Value); N]) -> Metadata {
  pairs
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Creates a bus whose every event carries `context` (at least the run id).
/// The `START` signal is queued immediately.
pub fn channel(context: Metadata) -> (EventSink, EventStream) {
  let (tx, rx) = mpsc::unbounded_channel();
  let (done_tx, done_rx) = watch::channel(false);
  let sink = EventSink {
    tx,
    done: Arc::new(done_tx),
    context: Arc::new(context),
  };
  sink.send_signal(StreamingSignal::Start, Metadata::new());

  let stream = EventStream {
    rx,
    done: done_rx,
    done_closed: false,
  };
  (sink, stream)
}

/// Producer side of the bus.
#[derive(Debug, Clone)]
pub struct EventSink {
  tx: mpsc::UnboundedSender<StreamingData>,
  done: Arc<watch::Sender<bool>>,
  context: Arc<Metadata>,
}

impl EventSink {
  pub fn context(&self) -> &Metadata {
    &self.context
  }

  pub fn run_id(&self) -> Option<&str> {
    self.context.get("run_id").and_then(Value::as_str)
  }

  pub fn is_finished(&self) -> bool {
    *self.done.borrow()
  }

  /// Queues one item. The run context wins over colliding metadata keys.
  pub fn send(&self, data: impl Into<String>, data_type: StreamingDataType, mut metadata: Metadata) {
    for (key, value) in self.context.iter() {
      metadata.insert(key.clone(), value.clone());
    }
    // The consumer may have gone away; events are then dropped.
    let _ = self.tx.send(StreamingData::new(data, data_type, metadata));
  }

  pub fn send_signal(&self, signal: StreamingSignal, metadata: Metadata) {
    self.send(signal.to_string(), StreamingDataType::Signal, metadata);
  }

  pub fn on_llm_new_token(&self, token: &str) {
    self.send(token, StreamingDataType::Llm, Metadata::new());
  }

  pub fn on_llm_end(&self) {
    self.send_signal(StreamingSignal::LlmEnd, Metadata::new());
  }

  /// Reports a run-level failure and completes the stream.
  pub fn on_llm_error(&self, message: &str) {
    self.send(message, StreamingDataType::Llm, Metadata::new());
    self.finish();
  }

  pub fn on_tool_start(&self, tool: &str) {
    self.send(
      tool,
      StreamingDataType::Action,
      metadata([
        ("tool", Value::from(tool)),
        ("step", Value::from(0)),
        ("time", Value::from(chrono::Utc::now().to_rfc3339())),
      ]),
    );
  }

  pub fn on_tool_end(&self, tool: &str) {
    self.send_signal(
      StreamingSignal::ToolEnd,
      metadata([("tool", Value::from(tool)), ("name", Value::from(tool))]),
    );
  }

  pub fn on_tool_error(&self, tool: &str, error: &str) {
    self.send(
      "error",
      StreamingDataType::Action,
      metadata([
        ("step", Value::from(1)),
        ("tool", Value::from(tool)),
        ("error", Value::from(error)),
      ]),
    );
  }

  /// Free-form progress or result event. Action names are upper-cased.
  pub fn on_text(&self, text: &str, data_type: StreamingDataType, metadata: Metadata) {
    if data_type == StreamingDataType::Action {
      self.send(text.to_uppercase(), data_type, metadata);
    } else {
      self.send(text, data_type, metadata);
    }
  }

  pub fn on_agent_finish(&self) {
    self.send_signal(StreamingSignal::End, Metadata::new());
    self.finish();
  }

  /// Sets the completion flag. Items already queued are still delivered.
  pub fn finish(&self) {
    self.done.send_replace(true);
  }
}

/// Consumer side of the bus.
#[derive(Debug)]
pub struct EventStream {
  rx: mpsc::UnboundedReceiver<StreamingData>,
  done: watch::Receiver<bool>,
  done_closed: bool,
}

impl EventStream {
  /// Next queued item, or `None` once the queue is drained and the run is
  /// finished (or every sink is gone).
  pub async fn next(&mut self) -> Option<StreamingData> {
    loop {
      match self.rx.try_recv() {
        Ok(item) => return Some(item),
        Err(TryRecvError::Disconnected) => return None,
        Err(TryRecvError::Empty) => {}
      }
      if *self.done.borrow_and_update() {
        return None;
      }

      tokio::select! {
        item = self.rx.recv() => return item,
        changed = self.done.changed(), if !self.done_closed => {
          if changed.is_err() {
            self.done_closed = true;
          }
        }
      }
    }
  }

  pub fn into_stream(mut self) -> impl Stream<Item = StreamingData> + Send + 'static {
    async_stream::stream! {
      while let Some(item) = self.next().await {
        yield item;
      }
    }
  }
}
