// src/fan_out.rs

//! One-to-many broadcast.
//!
//! A fan-out session receives each item from one input and delivers a copy to
//! every output before it receives the next one. Deliveries are blocking sends,
//! so the session runs at the pace of the slowest consumer; give the outputs
//! more capacity to absorb bursts. When the input closes and drains, every
//! output is closed in turn and the thread exits.
//!
//! There is no cancellation: to stop a fan-out early, close its input.

use crate::error::{SessionPanicked, SpawnError};
use crate::probe::{Probe, RecvProbe};
use crate::queue::{self, Queue};
use crate::select::{Signal, Source, Watch};
use crate::session::Session;
use crate::telemetry::{self, EventKind};

use std::fmt;
use std::sync::Arc;

const LOC: &str = "fan_out::broadcast";

/// A running fan-out session.
pub struct FanOut<T> {
  outputs: Vec<Queue<T>>,
  session: Session,
}

impl<T> FanOut<T> {
  /// The output queues, one per consumer. Empty for a zero-way fan-out.
  pub fn outputs(&self) -> &[Queue<T>] {
    &self.outputs
  }

  /// The background thread.
  pub fn session(&self) -> &Session {
    &self.session
  }

  /// Waits for the broadcasting thread to exit, which happens once the input
  /// is closed and drained and every delivery went through.
  ///
  /// # Errors
  ///
  /// Returns `Err(SessionPanicked)` if the thread panicked. The outputs were
  /// still closed.
  pub fn join(self) -> Result<(), SessionPanicked> {
    self.session.join()
  }

  /// Splits the session into its outputs and its thread.
  pub fn into_parts(self) -> (Vec<Queue<T>>, Session) {
    (self.outputs, self.session)
  }
}

impl<T> fmt::Debug for FanOut<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FanOut")
      .field("outputs", &self.outputs.len())
      .field("session", &self.session)
      .finish()
  }
}

/// Configures and starts a fan-out session.
#[derive(Debug, Clone, Default)]
pub struct FanOutBuilder {
  outputs: usize,
  capacity: usize,
  thread_name: Option<String>,
}

impl FanOutBuilder {
  /// A builder for zero rendezvous outputs and an unnamed thread.
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of output queues.
  pub fn outputs(mut self, n: usize) -> Self {
    self.outputs = n;
    self
  }

  /// Buffer capacity of each output queue. `0` makes them rendezvous queues.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Name of the broadcasting thread.
  pub fn thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = Some(name.into());
    self
  }

  /// Starts broadcasting `input`.
  ///
  /// With zero outputs nothing is started and `input` is dropped untouched.
  ///
  /// # Errors
  ///
  /// Returns a [`SpawnError`] if the thread could not be started.
  pub fn spawn<S>(self, input: S) -> Result<FanOut<S::Item>, SpawnError>
  where
    S: Source,
    S::Item: Clone + Send + 'static,
  {
    if self.outputs == 0 {
      return Ok(FanOut {
        outputs: Vec::new(),
        session: Session::finished(),
      });
    }

    let outputs: Vec<Queue<S::Item>> = (0..self.outputs)
      .map(|_| queue::bounded(self.capacity))
      .collect();
    let broadcaster = Broadcaster::new(input, outputs.clone());
    let name = self.thread_name.as_deref();
    let session = Session::spawn(name, "fan_out", move || broadcaster.run())?;
    Ok(FanOut { outputs, session })
  }
}

/// Broadcasts `input` to `n` new output queues of the given capacity.
///
/// # Errors
///
/// See [`FanOutBuilder::spawn`].
pub fn fan_out<S>(n: usize, capacity: usize, input: S) -> Result<FanOut<S::Item>, SpawnError>
where
  S: Source,
  S::Item: Clone + Send + 'static,
{
  FanOutBuilder::new().outputs(n).capacity(capacity).spawn(input)
}

/// Dropping it closes every output.
struct Broadcaster<S: Source> {
  input: S,
  outputs: Vec<Queue<S::Item>>,
  // Outputs a consumer closed on us; skipped from then on.
  dead: Vec<bool>,
  signal: Arc<Signal>,
}

impl<S> Broadcaster<S>
where
  S: Source,
  S::Item: Clone + Send,
{
  fn new(input: S, outputs: Vec<Queue<S::Item>>) -> Self {
    let signal = Arc::new(Signal::new());
    input.watch(&signal);
    Broadcaster {
      input,
      dead: vec![false; outputs.len()],
      outputs,
      signal,
    }
  }

  fn run(mut self) {
    let outputs = self.outputs.len();
    telemetry::log_event(None, LOC, EventKind::Start, Some(format_args!("outputs={}", outputs)));
    loop {
      match self.input.probe_recv() {
        RecvProbe::Ok(item) => self.deliver(item),
        RecvProbe::Closed => {
          telemetry::log_event(None, LOC, EventKind::SourceClosed, None);
          return;
        }
        RecvProbe::Blocked => self.signal.wait(),
      }
    }
  }

  /// Sends `item` to every live output. The last one gets the original, so a
  /// single output never clones.
  fn deliver(&mut self, item: S::Item) {
    let Some(last) = self.outputs.len().checked_sub(1) else {
      return;
    };
    for index in 0..last {
      if !self.dead[index] {
        self.send_to(index, item.clone());
      }
    }
    if !self.dead[last] {
      self.send_to(last, item);
    }
  }

  fn send_to(&mut self, index: usize, item: S::Item) {
    if self.outputs[index].send(item).is_ok() {
      return;
    }
    self.dead[index] = true;
    log::warn!("fan-out output {} was closed by a consumer, skipping it", index);
    telemetry::log_event(Some(index), LOC, EventKind::OutputClosed, None);
  }
}

impl<S: Source> Drop for Broadcaster<S> {
  fn drop(&mut self) {
    self.input.unwatch(&self.signal);
    for output in &self.outputs {
      output.shared.close_core();
    }
    log::trace!("fan-out broadcaster exiting, {} outputs closed", self.outputs.len());
    telemetry::log_event(None, LOC, EventKind::Exit, None);
  }
}
