// src/fan_in.rs

//! Many-to-one merge with cooperative cancellation.
//!
//! A fan-in session reads from K inputs and forwards every item to a single
//! output queue. The output is closed exactly once: when every input has closed
//! and drained, or when the session is cancelled, whichever happens first.
//!
//! - K = 0: the output is created closed and no thread is started.
//! - K = 1: a single thread forwards from the sole input.
//! - K ≥ 2: a single thread waits on all inputs and the cancellation queue at
//!   once with a [`Select`], tombstoning inputs as they close.
//!
//! Items keep their per-input order. Items from different inputs interleave
//! arbitrarily.
//!
//! ```
//! use plexus::{fan_in, queue};
//!
//! let a = queue::bounded::<&str>(1);
//! let b = queue::bounded::<&str>(1);
//! let merged = fan_in(2, vec![a.clone(), b.clone()]).unwrap();
//!
//! a.send("Hello").unwrap();
//! a.close().unwrap();
//! b.send("Goodbye").unwrap();
//! b.close().unwrap();
//!
//! let mut got: Vec<_> = std::iter::from_fn(|| merged.output().recv().ok()).collect();
//! got.sort();
//! assert_eq!(got, vec!["Goodbye", "Hello"]);
//! assert!(merged.stop().is_ok());
//! ```

use crate::error::{SessionPanicked, SpawnError};
use crate::probe::{Probe, RecvProbe};
use crate::queue::{self, Forwarded, Queue};
use crate::select::{Select, Selected, Signal, Source, Watch};
use crate::session::Session;
use crate::telemetry::{self, EventKind};

use std::fmt;
use std::sync::Arc;

const LOC_ONE: &str = "fan_in::forward";
const LOC_MANY: &str = "fan_in::merge";

/// One-shot cancellation handle of a fan-in session.
///
/// Cancelling closes an internal `Queue<()>` that the session watches. It is
/// safe from any thread, at any time, any number of times.
#[derive(Clone)]
pub struct Canceller {
  queue: Queue<()>,
}

impl Canceller {
  fn new() -> Self {
    Canceller {
      queue: queue::bounded(0),
    }
  }

  /// Fires the cancellation. Returns `true` only for the call that fired it;
  /// later calls are no-ops.
  pub fn cancel(&self) -> bool {
    self.queue.close().is_ok()
  }

  /// Returns `true` once cancellation has fired.
  pub fn is_cancelled(&self) -> bool {
    self.queue.is_closed()
  }
}

impl fmt::Debug for Canceller {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Canceller")
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

/// A running fan-in session.
///
/// Dropping it detaches the merging thread; the thread still exits once its
/// inputs close. Use [`stop`](Self::stop) to end it early and wait for it.
pub struct FanIn<T> {
  output: Queue<T>,
  canceller: Canceller,
  session: Session,
}

impl<T> FanIn<T> {
  /// The merged output. Closed once the session terminates.
  pub fn output(&self) -> &Queue<T> {
    &self.output
  }

  /// A handle that cancels this session.
  pub fn canceller(&self) -> &Canceller {
    &self.canceller
  }

  /// Shorthand for `self.canceller().cancel()`.
  pub fn cancel(&self) -> bool {
    self.canceller.cancel()
  }

  /// The background thread.
  pub fn session(&self) -> &Session {
    &self.session
  }

  /// Cancels the session and waits for the merging thread to exit. The output
  /// is closed when this returns; items merged before cancellation stay
  /// receivable from it.
  ///
  /// # Errors
  ///
  /// Returns `Err(SessionPanicked)` if the merging thread panicked.
  pub fn stop(self) -> Result<(), SessionPanicked> {
    self.canceller.cancel();
    self.session.join()
  }

  /// Splits the session into its output, its canceller and its thread.
  pub fn into_parts(self) -> (Queue<T>, Canceller, Session) {
    (self.output, self.canceller, self.session)
  }
}

impl<T> fmt::Debug for FanIn<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FanIn")
      .field("output", &self.output)
      .field("canceller", &self.canceller)
      .field("session", &self.session)
      .finish()
  }
}

/// Configures and starts a fan-in session.
#[derive(Debug, Clone, Default)]
pub struct FanInBuilder {
  capacity: usize,
  thread_name: Option<String>,
}

impl FanInBuilder {
  /// A builder for a rendezvous output and an unnamed thread.
  pub fn new() -> Self {
    Self::default()
  }

  /// Buffer capacity of the output queue. `0` makes it a rendezvous queue.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Name of the merging thread.
  pub fn thread_name(mut self, name: impl Into<String>) -> Self {
    self.thread_name = Some(name.into());
    self
  }

  /// Starts merging `inputs`.
  ///
  /// # Errors
  ///
  /// Returns a [`SpawnError`] if the merging thread could not be started. The
  /// inputs are dropped in that case; none of them is closed.
  pub fn spawn<S>(self, inputs: Vec<S>) -> Result<FanIn<S::Item>, SpawnError>
  where
    S: Source,
    S::Item: Send + 'static,
  {
    let output = queue::bounded(self.capacity);
    let canceller = Canceller::new();
    let name = self.thread_name.as_deref();

    let session = match <[S; 1]>::try_from(inputs) {
      Ok([input]) => {
        let forwarder = Forwarder::new(input, output.clone(), canceller.queue.clone());
        Session::spawn(name, "fan_in", move || forwarder.run())?
      }
      Err(inputs) if inputs.is_empty() => {
        output.shared.close_core();
        Session::finished()
      }
      Err(inputs) => {
        log::debug!("merging {} inputs", inputs.len());
        let merger = Merger::new(inputs, output.clone(), canceller.queue.clone());
        Session::spawn(name, "fan_in", move || merger.run())?
      }
    };

    Ok(FanIn {
      output,
      canceller,
      session,
    })
  }
}

/// Merges `inputs` into a new output queue of the given capacity.
///
/// # Errors
///
/// See [`FanInBuilder::spawn`].
pub fn fan_in<S>(capacity: usize, inputs: Vec<S>) -> Result<FanIn<S::Item>, SpawnError>
where
  S: Source,
  S::Item: Send + 'static,
{
  FanInBuilder::new().capacity(capacity).spawn(inputs)
}

/// Forwarding state for a single input. Dropping it releases every watch and
/// closes the output, so the output is closed on every exit path.
struct Forwarder<S: Source> {
  input: S,
  output: Queue<S::Item>,
  cancel: Queue<()>,
  signal: Arc<Signal>,
}

impl<S> Forwarder<S>
where
  S: Source,
  S::Item: Send,
{
  fn new(input: S, output: Queue<S::Item>, cancel: Queue<()>) -> Self {
    let signal = Arc::new(Signal::new());
    input.watch(&signal);
    output.add_observer(&signal);
    cancel.add_observer(&signal);
    Forwarder {
      input,
      output,
      cancel,
      signal,
    }
  }

  fn run(&self) {
    telemetry::log_event(Some(0), LOC_ONE, EventKind::Start, None);
    loop {
      if self.cancel.is_closed() {
        telemetry::log_event(None, LOC_ONE, EventKind::Cancelled, None);
        return;
      }
      match self.input.probe_recv() {
        RecvProbe::Ok(item) => {
          if !self.forward(item) {
            return;
          }
        }
        RecvProbe::Closed => {
          telemetry::log_event(Some(0), LOC_ONE, EventKind::SourceClosed, None);
          return;
        }
        RecvProbe::Blocked => self.signal.wait(),
      }
    }
  }

  /// Returns `false` if the session must stop.
  fn forward(&self, item: S::Item) -> bool {
    let outcome = queue::send_watched(&self.output, item, &self.signal, || self.cancel.is_closed());
    telemetry::log_event(Some(0), LOC_ONE, forwarded_event(outcome), None);
    outcome == Forwarded::Sent
  }
}

impl<S: Source> Drop for Forwarder<S> {
  fn drop(&mut self) {
    self.input.unwatch(&self.signal);
    self.output.remove_observer(&self.signal);
    self.cancel.remove_observer(&self.signal);
    let closed = self.output.shared.close_core();
    log::trace!("fan-in forwarder exiting, output closed here: {}", closed);
    telemetry::log_event(None, LOC_ONE, EventKind::Exit, None);
  }
}

/// Merging state for two or more inputs. The `Select` owns the inputs and the
/// cancellation watch; dropping the merger closes the output.
struct Merger<S: Source> {
  select: Select<S>,
  output: Queue<S::Item>,
}

impl<S> Merger<S>
where
  S: Source,
  S::Item: Send,
{
  fn new(inputs: Vec<S>, output: Queue<S::Item>, cancel: Queue<()>) -> Self {
    let mut select = Select::with_capacity(inputs.len()).with_cancel(cancel);
    for input in inputs {
      select.add(input);
    }
    output.add_observer(select.signal());
    Merger { select, output }
  }

  fn run(mut self) {
    let inputs = self.select.len();
    telemetry::log_event(
      None,
      LOC_MANY,
      EventKind::Start,
      Some(format_args!("inputs={}", inputs)),
    );
    loop {
      match self.select.wait() {
        Selected::Item(index, item) => {
          let select = &self.select;
          let outcome =
            queue::send_watched(&self.output, item, select.signal(), || select.is_cancelled());
          telemetry::log_event(Some(index), LOC_MANY, forwarded_event(outcome), None);
          if outcome != Forwarded::Sent {
            return;
          }
        }
        Selected::Closed(index) => {
          log::trace!("fan-in input {} closed, {} left", index, self.select.live());
          telemetry::log_event(Some(index), LOC_MANY, EventKind::SourceClosed, None);
        }
        Selected::Cancelled => {
          telemetry::log_event(None, LOC_MANY, EventKind::Cancelled, None);
          return;
        }
        Selected::Exhausted => return,
      }
    }
  }
}

impl<S: Source> Drop for Merger<S> {
  fn drop(&mut self) {
    self.output.remove_observer(self.select.signal());
    let closed = self.output.shared.close_core();
    log::trace!("fan-in merger exiting, output closed here: {}", closed);
    telemetry::log_event(None, LOC_MANY, EventKind::Exit, None);
  }
}

fn forwarded_event(outcome: Forwarded) -> EventKind {
  match outcome {
    Forwarded::Sent => EventKind::Forwarded,
    Forwarded::Closed => EventKind::OutputClosed,
    Forwarded::Interrupted => EventKind::ForwardInterrupted,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::erased::{ErasedQueue, Value};
  use crate::error::TryRecvError;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn zero_inputs_yield_closed_output() {
    let merged = fan_in::<Queue<u32>>(1, Vec::new()).unwrap();
    assert!(merged.output().is_closed());
    assert!(merged.session().is_finished());
    assert!(merged.output().recv().is_err());
    assert!(merged.stop().is_ok());
  }

  #[test]
  fn single_input_is_forwarded_in_order() {
    let input = queue::bounded::<u32>(1);
    let merged = fan_in(2, vec![input.clone()]).unwrap();
    let producer = {
      let input = input.clone();
      thread::spawn(move || {
        for i in 0..10 {
          input.send(i).unwrap();
        }
        input.close().unwrap();
      })
    };
    let got: Vec<_> = std::iter::from_fn(|| merged.output().recv().ok()).collect();
    assert_eq!(got, (0..10).collect::<Vec<_>>());
    producer.join().unwrap();
    let (output, _, session) = merged.into_parts();
    assert_eq!(session.join(), Ok(()));
    assert!(output.shared.state.lock().observers.is_empty());
    assert!(input.shared.state.lock().observers.is_empty());
  }

  #[test]
  fn single_input_stops_on_cancel() {
    let input = queue::bounded::<u32>(1);
    let merged = fan_in(0, vec![input.clone()]).unwrap();
    assert!(merged.cancel());
    assert!(!merged.cancel());
    assert!(merged.output().recv().is_err());
    assert_eq!(merged.stop(), Ok(()));
    assert!(!input.is_closed());
  }

  #[test]
  fn cancel_interrupts_blocked_forwarding() {
    let a = queue::unbounded::<u32>();
    let b = queue::unbounded::<u32>();
    a.send(1).unwrap();
    a.send(2).unwrap();
    let merged = fan_in(0, vec![a.clone(), b.clone()]).unwrap();
    // Nobody receives from the rendezvous output, so the merger is stuck
    // forwarding the first item.
    thread::sleep(Duration::from_millis(20));
    assert!(!merged.session().is_finished());
    assert_eq!(merged.stop(), Ok(()));
    assert!(a.shared.state.lock().observers.is_empty());
    assert!(b.shared.state.lock().observers.is_empty());
  }

  #[test]
  fn cancel_interrupts_blocked_single_input_forwarding() {
    let input = queue::unbounded::<u32>();
    input.send(1).unwrap();
    input.send(2).unwrap();
    let merged = fan_in(0, vec![input.clone()]).unwrap();
    let output = merged.output().clone();
    let canceller = merged.canceller().clone();
    // The forwarder holds item 1 and waits for a receiver that never comes.
    thread::sleep(Duration::from_millis(20));
    assert!(!merged.session().is_finished());

    assert_eq!(merged.stop(), Ok(()));
    assert!(output.is_closed());
    assert_eq!(output.try_recv(), Err(TryRecvError::Closed));
    assert!(input.shared.state.lock().observers.is_empty());
    assert!(output.shared.state.lock().observers.is_empty());
    assert!(canceller.queue.shared.state.lock().observers.is_empty());
    // Item 1 was dropped in flight; item 2 is still queued and the input open.
    assert!(!input.is_closed());
    assert_eq!(input.len(), 1);
    assert_eq!(input.try_recv(), Ok(2));
  }

  #[test]
  fn erased_inputs_of_different_types_merge() {
    let words = queue::bounded::<&'static str>(1);
    let numbers = queue::bounded::<u64>(1);
    let merged = fan_in(4, vec![words.erase(), ErasedQueue::new(numbers.clone())]).unwrap();

    words.send("Hello").unwrap();
    numbers.send(42).unwrap();
    words.close().unwrap();
    numbers.close().unwrap();

    let got: Vec<Value> = std::iter::from_fn(|| merged.output().recv().ok()).collect();
    assert_eq!(got.len(), 2);
    assert!(got.iter().any(|v| v.downcast_ref::<&str>() == Some(&"Hello")));
    assert!(got.iter().any(|v| v.downcast_ref::<u64>() == Some(&42)));
    assert_eq!(merged.stop(), Ok(()));
  }
}
