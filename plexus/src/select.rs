//! Dynamic multi-way wait.
//!
//! [`Select`] blocks on a run-time sized set of queues plus an optional
//! cancellation queue, and reports which one became ready. Sources register a
//! shared [`Signal`] with every queue they watch; any queue transition that
//! could let a probe make progress raises it, and the waiter then re-probes.
//!
//! The source set lives in an arena of slots. When a source closes its slot is
//! tombstoned in place, so the set only ever shrinks logically and is never
//! reallocated or compacted while waiting.

use crate::probe::{Probe, RecvProbe};
use crate::queue::Queue;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A latched wake-up flag.
///
/// `notify` raises the flag; `wait` blocks until it is raised and lowers it
/// again. A notification that arrives while nobody waits is kept, so a waiter
/// that probes and then waits never misses a change that happened in between.
#[derive(Debug, Default)]
pub struct Signal {
  raised: Mutex<bool>,
  cond: Condvar,
}

impl Signal {
  /// Creates a lowered signal.
  pub fn new() -> Self {
    Signal {
      raised: Mutex::new(false),
      cond: Condvar::new(),
    }
  }

  /// Raises the signal, waking any waiter.
  pub fn notify(&self) {
    let mut raised = self.raised.lock();
    *raised = true;
    self.cond.notify_all();
  }

  /// Blocks until the signal is raised, then lowers it.
  pub fn wait(&self) {
    let mut raised = self.raised.lock();
    while !*raised {
      self.cond.wait(&mut raised);
    }
    *raised = false;
  }

  /// Like [`wait`](Self::wait), but gives up after `timeout`. Returns whether
  /// the signal was raised.
  pub fn wait_timeout(&self, timeout: Duration) -> bool {
    let Some(deadline) = Instant::now().checked_add(timeout) else {
      self.wait();
      return true;
    };
    let mut raised = self.raised.lock();
    while !*raised {
      if self.cond.wait_until(&mut raised, deadline).timed_out() {
        break;
      }
    }
    std::mem::replace(&mut *raised, false)
  }

  /// Returns `true` if the signal is currently raised.
  pub fn is_raised(&self) -> bool {
    *self.raised.lock()
  }
}

/// Queues that can raise a [`Signal`] when their state changes.
pub trait Watch {
  /// Registers `signal`. Registering the same signal twice has no effect.
  fn watch(&self, signal: &Arc<Signal>);
  /// Unregisters `signal`.
  fn unwatch(&self, signal: &Arc<Signal>);
}

impl<T: Send> Watch for Queue<T> {
  fn watch(&self, signal: &Arc<Signal>) {
    self.add_observer(signal);
  }

  fn unwatch(&self, signal: &Arc<Signal>) {
    self.remove_observer(signal);
  }
}

/// A queue a session can read from: probe-able, watchable and movable to the
/// session's thread.
pub trait Source: Probe + Watch + Send + 'static {}

impl<S: Probe + Watch + Send + 'static> Source for S {}

/// What a [`Select`] observed.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Selected<T> {
  /// Source `index` produced an item.
  Item(usize, T),
  /// Source `index` is closed and drained. Its slot has been tombstoned and
  /// will not be probed again.
  Closed(usize),
  /// The cancellation queue was closed.
  Cancelled,
  /// Every source has closed.
  Exhausted,
}

/// Waits on a dynamic set of sources at once.
pub struct Select<S: Probe + Watch> {
  slots: Vec<Option<S>>,
  live: usize,
  cursor: usize,
  signal: Arc<Signal>,
  cancel: Option<Queue<()>>,
}

impl<S: Probe + Watch> Select<S> {
  /// Creates an empty select.
  pub fn new() -> Self {
    Self::with_capacity(0)
  }

  /// Creates an empty select with room for `capacity` sources.
  pub fn with_capacity(capacity: usize) -> Self {
    Select {
      slots: Vec::with_capacity(capacity),
      live: 0,
      cursor: 0,
      signal: Arc::new(Signal::new()),
      cancel: None,
    }
  }

  /// Also wakes, with [`Selected::Cancelled`], once `cancel` is closed.
  /// Cancellation takes priority over ready items.
  pub fn with_cancel(mut self, cancel: Queue<()>) -> Self {
    cancel.add_observer(&self.signal);
    if let Some(previous) = self.cancel.replace(cancel) {
      previous.remove_observer(&self.signal);
    }
    self
  }

  /// Adds a source and returns its slot index.
  pub fn add(&mut self, source: S) -> usize {
    source.watch(&self.signal);
    self.slots.push(Some(source));
    self.live += 1;
    self.slots.len() - 1
  }

  /// Removes the source at `index`, leaving a tombstone.
  pub fn remove(&mut self, index: usize) -> Option<S> {
    let source = self.slots.get_mut(index)?.take()?;
    source.unwatch(&self.signal);
    self.live -= 1;
    Some(source)
  }

  /// Number of sources that have not closed.
  pub fn live(&self) -> usize {
    self.live
  }

  /// Number of slots, tombstones included.
  pub fn len(&self) -> usize {
    self.slots.len()
  }

  /// Returns `true` if no source was ever added.
  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  /// The signal raised by every watched queue. Other queues the caller wants
  /// to wait on together with the sources can be watched with it.
  pub fn signal(&self) -> &Arc<Signal> {
    &self.signal
  }

  /// Returns `true` once the cancellation queue is closed.
  pub fn is_cancelled(&self) -> bool {
    self.cancel.as_ref().is_some_and(|c| c.is_closed())
  }

  /// Probes every live source once, starting after the last one served.
  /// Returns `None` if nothing was ready.
  pub fn try_select(&mut self) -> Option<Selected<S::Item>> {
    if self.is_cancelled() {
      return Some(Selected::Cancelled);
    }
    if self.live == 0 {
      return Some(Selected::Exhausted);
    }

    let n = self.slots.len();
    for step in 0..n {
      let index = (self.cursor + step) % n;
      let probe = match &self.slots[index] {
        Some(source) => source.probe_recv(),
        None => continue,
      };
      match probe {
        RecvProbe::Ok(item) => {
          self.cursor = (index + 1) % n;
          return Some(Selected::Item(index, item));
        }
        RecvProbe::Closed => {
          self.remove(index);
          self.cursor = (index + 1) % n;
          return Some(Selected::Closed(index));
        }
        RecvProbe::Blocked => {}
      }
    }
    None
  }

  /// Blocks until a source is ready, a source closes, every source has closed
  /// or the select is cancelled.
  pub fn wait(&mut self) -> Selected<S::Item> {
    loop {
      if let Some(selected) = self.try_select() {
        return selected;
      }
      self.signal.wait();
    }
  }

  /// Like [`wait`](Self::wait), but returns `None` if nothing happened within
  /// `timeout`.
  pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Selected<S::Item>> {
    let Some(deadline) = Instant::now().checked_add(timeout) else {
      return Some(self.wait());
    };
    loop {
      if let Some(selected) = self.try_select() {
        return Some(selected);
      }
      let remaining = deadline.checked_duration_since(Instant::now())?;
      self.signal.wait_timeout(remaining);
    }
  }
}

impl<S: Probe + Watch> Default for Select<S> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: Probe + Watch> Drop for Select<S> {
  fn drop(&mut self) {
    for source in self.slots.iter().flatten() {
      source.unwatch(&self.signal);
    }
    if let Some(cancel) = &self.cancel {
      cancel.remove_observer(&self.signal);
    }
  }
}

impl<S: Probe + Watch> fmt::Debug for Select<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Select")
      .field("slots", &self.slots.len())
      .field("live", &self.live)
      .field("cancelled", &self.is_cancelled())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue;
  use std::thread;

  #[test]
  fn signal_latches_early_notification() {
    let signal = Signal::new();
    signal.notify();
    assert!(signal.is_raised());
    signal.wait();
    assert!(!signal.is_raised());
    assert!(!signal.wait_timeout(Duration::from_millis(5)));
  }

  #[test]
  fn huge_timeouts_wait_without_deadline() {
    let signal = Signal::new();
    signal.notify();
    assert!(signal.wait_timeout(Duration::MAX));

    let a = queue::bounded::<u32>(1);
    a.send(4).unwrap();
    let mut select = Select::new();
    select.add(a.clone());
    assert_eq!(select.wait_timeout(Duration::MAX), Some(Selected::Item(0, 4)));
  }

  #[test]
  fn wait_returns_ready_item() {
    let a = queue::bounded::<u32>(1);
    let b = queue::bounded::<u32>(1);
    let mut select = Select::new();
    assert_eq!(select.add(a.clone()), 0);
    assert_eq!(select.add(b.clone()), 1);

    let producer = thread::spawn(move || {
      thread::sleep(Duration::from_millis(30));
      b.send(7).unwrap();
    });
    assert_eq!(select.wait(), Selected::Item(1, 7));
    producer.join().unwrap();
    assert_eq!(select.try_select(), None);
  }

  #[test]
  fn closed_source_is_tombstoned_once() {
    let a = queue::bounded::<u32>(1);
    let b = queue::bounded::<u32>(1);
    let mut select = Select::new();
    select.add(a.clone());
    select.add(b.clone());

    a.close().unwrap();
    assert_eq!(select.wait(), Selected::Closed(0));
    assert_eq!(select.live(), 1);
    assert_eq!(select.len(), 2);
    assert!(a.shared.state.lock().observers.is_empty());

    b.send(1).unwrap();
    assert_eq!(select.wait(), Selected::Item(1, 1));
    b.close().unwrap();
    assert_eq!(select.wait(), Selected::Closed(1));
    assert_eq!(select.wait(), Selected::Exhausted);
    assert_eq!(select.len(), 2);
  }

  #[test]
  fn round_robin_serves_every_ready_source() {
    let queues: Vec<_> = (0..3).map(|_| queue::unbounded::<usize>()).collect();
    let mut select = Select::new();
    for (i, q) in queues.iter().enumerate() {
      for _ in 0..2 {
        q.send(i).unwrap();
      }
      select.add(q.clone());
    }
    let mut served = Vec::new();
    for _ in 0..3 {
      match select.wait() {
        Selected::Item(i, v) => {
          assert_eq!(i, v);
          served.push(i);
        }
        other => panic!("unexpected {:?}", other),
      }
    }
    served.sort_unstable();
    assert_eq!(served, vec![0, 1, 2]);
  }

  #[test]
  fn cancel_wins_over_ready_items() {
    let a = queue::bounded::<u32>(1);
    a.send(1).unwrap();
    let cancel = queue::bounded::<()>(0);
    let mut select = Select::new().with_cancel(cancel.clone());
    select.add(a);
    cancel.close().unwrap();
    assert_eq!(select.wait(), Selected::Cancelled);
  }

  #[test]
  fn cancel_wakes_blocked_wait() {
    let a = queue::bounded::<u32>(1);
    let cancel = queue::bounded::<()>(0);
    let mut select = Select::new().with_cancel(cancel.clone());
    select.add(a);
    let canceller = thread::spawn(move || {
      thread::sleep(Duration::from_millis(30));
      cancel.close().unwrap();
    });
    assert_eq!(select.wait(), Selected::Cancelled);
    canceller.join().unwrap();
  }

  #[test]
  fn wait_timeout_gives_up() {
    let mut select = Select::new();
    select.add(queue::bounded::<u32>(1));
    assert_eq!(select.wait_timeout(Duration::from_millis(10)), None);
  }

  #[test]
  fn drop_unwatches_sources() {
    let a = queue::bounded::<u32>(1);
    {
      let mut select = Select::new();
      select.add(a.clone());
      assert_eq!(a.shared.state.lock().observers.len(), 1);
    }
    assert!(a.shared.state.lock().observers.is_empty());
  }
}
