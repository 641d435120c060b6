//! Parked-party bookkeeping shared by the sync and async halves of the queue.
//!
//! A blocked thread or task leaves an `Arc<WaitCell>` in the queue state. Whoever
//! makes progress on its behalf pops the cell, stores an outcome into it and
//! wakes the owner. The owner only ever reads the outcome.

use crate::select::Signal;

use futures_util::task::AtomicWaker;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread::{self, Thread};

/// Still parked in the queue.
pub(crate) const WAITING: u8 = 0;
/// Popped and woken; the owner should retry its operation.
pub(crate) const NOTIFIED: u8 = 1;
/// A rendezvous receiver took the item out of the parked sender's slot.
pub(crate) const TAKEN: u8 = 2;
/// The queue was closed while the owner was parked.
pub(crate) const CLOSED: u8 = 3;

#[derive(Debug)]
enum Parker {
  Thread(Thread),
  Task(AtomicWaker),
  Signal(Arc<Signal>),
}

#[derive(Debug)]
pub(crate) struct WaitCell {
  state: AtomicU8,
  parker: Parker,
}

impl WaitCell {
  /// A cell owned by the calling thread.
  pub(crate) fn for_thread() -> Arc<Self> {
    Arc::new(Self {
      state: AtomicU8::new(WAITING),
      parker: Parker::Thread(thread::current()),
    })
  }

  /// A cell owned by the task polling with `waker`.
  pub(crate) fn for_task(waker: &Waker) -> Arc<Self> {
    let atomic = AtomicWaker::new();
    atomic.register(waker);
    Arc::new(Self {
      state: AtomicU8::new(WAITING),
      parker: Parker::Task(atomic),
    })
  }

  /// A cell whose owner waits on `signal`, typically alongside other queues.
  pub(crate) fn for_signal(signal: &Arc<Signal>) -> Arc<Self> {
    Arc::new(Self {
      state: AtomicU8::new(WAITING),
      parker: Parker::Signal(Arc::clone(signal)),
    })
  }

  #[inline]
  pub(crate) fn state(&self) -> u8 {
    self.state.load(Ordering::Acquire)
  }

  #[inline]
  pub(crate) fn is_done(&self) -> bool {
    self.state() != WAITING
  }

  /// Refreshes the waker of a task-owned cell. No-op for thread cells.
  pub(crate) fn register(&self, waker: &Waker) {
    if let Parker::Task(atomic) = &self.parker {
      atomic.register(waker);
    }
  }

  /// Publishes `outcome` and wakes the owner.
  pub(crate) fn complete(&self, outcome: u8) {
    self.state.store(outcome, Ordering::Release);
    match &self.parker {
      Parker::Thread(t) => t.unpark(),
      Parker::Task(atomic) => atomic.wake(),
      Parker::Signal(signal) => signal.notify(),
    }
  }
}

/// A parked sender. `item` is only populated on rendezvous queues, where the
/// receiver takes the value straight out of the sender's slot.
#[derive(Debug)]
pub(crate) struct ParkedSender<T> {
  pub(crate) cell: Arc<WaitCell>,
  pub(crate) item: Option<T>,
}
