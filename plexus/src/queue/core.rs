// src/queue/core.rs

//! The shared state behind every [`Queue`](super::Queue) handle.
//!
//! ### Design Principles:
//!
//! 1.  **Central Mutex**: A `parking_lot::Mutex` guards the buffer, the parked
//!     parties and the closed flag. Every transition happens under it.
//! 2.  **Explicit close**: the queue is closed by a `close` call, never by handles
//!     being dropped. A closed queue keeps its buffered items until they are
//!     drained; only then do receives report `Closed`.
//! 3.  **Closed hint**: `closed_hint` mirrors the closed flag in an atomic so that
//!     `is_closed` can be answered without the lock. It is set exactly once,
//!     under the lock, before anybody is woken.
//! 4.  **Observers**: sessions waiting on many queues at once register a
//!     [`Signal`] here. Every change that could let a probe make progress
//!     raises all registered signals.

use super::waiter::{ParkedSender, WaitCell, CLOSED, NOTIFIED, TAKEN};
use crate::error::{TryRecvError, TrySendError};
use crate::select::Signal;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capacity used to represent an unbounded queue.
pub(crate) const UNBOUNDED: usize = usize::MAX;

#[derive(Debug)]
pub(crate) struct QueueState<T> {
  /// Buffered items. On a rendezvous queue this only ever holds items that were
  /// handed to an already parked receiver.
  pub(crate) buffer: VecDeque<T>,
  pub(crate) parked_senders: VecDeque<ParkedSender<T>>,
  pub(crate) parked_receivers: VecDeque<Arc<WaitCell>>,
  pub(crate) observers: Vec<Arc<Signal>>,
  pub(crate) closed: bool,
}

impl<T> QueueState<T> {
  /// Raises every registered observer.
  #[inline]
  pub(crate) fn notify_observers(&self) {
    for signal in &self.observers {
      signal.notify();
    }
  }

  /// Whether a send could complete right now without parking.
  #[inline]
  pub(crate) fn has_room(&self, capacity: usize) -> bool {
    !self.parked_receivers.is_empty() || (capacity > 0 && self.buffer.len() < capacity)
  }

  /// Whether a receive could complete right now without parking.
  #[inline]
  pub(crate) fn has_item(&self, capacity: usize) -> bool {
    !self.buffer.is_empty() || (capacity == 0 && !self.parked_senders.is_empty())
  }

  /// Wakes one parked buffered sender after a slot was freed.
  fn wake_sender_for_room(&mut self, capacity: usize) {
    if capacity > 0 && self.buffer.len() < capacity {
      if let Some(parked) = self.parked_senders.pop_front() {
        parked.cell.complete(NOTIFIED);
      }
    }
  }

  /// Wakes one parked receiver if there is something left for it to take.
  fn wake_receiver_for_item(&mut self, capacity: usize) {
    if self.has_item(capacity) {
      if let Some(cell) = self.parked_receivers.pop_front() {
        cell.complete(NOTIFIED);
      }
    }
  }
}

#[derive(Debug)]
pub(crate) struct QueueShared<T> {
  pub(crate) state: Mutex<QueueState<T>>,
  pub(crate) capacity: usize,
  closed_hint: AtomicBool,
}

impl<T> QueueShared<T> {
  /// `UNBOUNDED` asks for a queue limited only by memory.
  pub(crate) fn new(capacity: usize) -> Self {
    QueueShared {
      state: Mutex::new(QueueState {
        buffer: VecDeque::with_capacity(if capacity == UNBOUNDED { 32 } else { capacity }),
        parked_senders: VecDeque::new(),
        parked_receivers: VecDeque::new(),
        observers: Vec::new(),
        closed: false,
      }),
      capacity,
      closed_hint: AtomicBool::new(false),
    }
  }

  #[inline]
  pub(crate) fn is_rendezvous(&self) -> bool {
    self.capacity == 0
  }

  /// Lock-free snapshot of the closed flag. `true` is final.
  #[inline]
  pub(crate) fn is_closed_hint(&self) -> bool {
    self.closed_hint.load(Ordering::Acquire)
  }

  /// Tries, in order:
  /// 1. Hand the item to a parked receiver (via the buffer).
  /// 2. Push the item into the buffer if there is space.
  pub(crate) fn try_send_core(&self, item: T) -> Result<(), TrySendError<T>> {
    let mut guard = self.state.lock();

    if guard.closed {
      return Err(TrySendError::Closed(item));
    }

    if let Some(cell) = guard.parked_receivers.pop_front() {
      guard.buffer.push_back(item);
      cell.complete(NOTIFIED);
      guard.notify_observers();
      return Ok(());
    }

    if self.capacity == 0 {
      // A rendezvous queue is "full" unless somebody is waiting.
      return Err(TrySendError::Full(item));
    }
    if self.capacity == UNBOUNDED || guard.buffer.len() < self.capacity {
      guard.buffer.push_back(item);
      guard.notify_observers();
      return Ok(());
    }

    Err(TrySendError::Full(item))
  }

  /// Tries, in order:
  /// 1. Take the oldest buffered item, waking a parked buffered sender.
  /// 2. Take the item out of a parked rendezvous sender's slot.
  pub(crate) fn try_recv_core(&self) -> Result<T, TryRecvError> {
    let mut guard = self.state.lock();

    if let Some(item) = guard.buffer.pop_front() {
      guard.wake_sender_for_room(self.capacity);
      guard.notify_observers();
      return Ok(item);
    }

    if self.capacity == 0 {
      while let Some(mut parked) = guard.parked_senders.pop_front() {
        if let Some(item) = parked.item.take() {
          parked.cell.complete(TAKEN);
          guard.notify_observers();
          return Ok(item);
        }
        // A slot without an item belongs to nobody useful; let its owner retry.
        parked.cell.complete(NOTIFIED);
      }
    }

    if guard.closed {
      Err(TryRecvError::Closed)
    } else {
      Err(TryRecvError::Empty)
    }
  }

  /// Transitions the queue to closed. Returns `false` if it already was.
  ///
  /// Parked receivers are woken to drain what is left. Parked senders are woken
  /// with `CLOSED`; rendezvous items still sitting in their slots are dropped.
  pub(crate) fn close_core(&self) -> bool {
    let mut guard = self.state.lock();
    if guard.closed {
      return false;
    }
    guard.closed = true;
    self.closed_hint.store(true, Ordering::Release);

    for cell in guard.parked_receivers.drain(..) {
      cell.complete(NOTIFIED);
    }
    for parked in guard.parked_senders.drain(..) {
      parked.cell.complete(CLOSED);
    }
    guard.notify_observers();
    true
  }

  /// Removes a receiver cell whose owner stopped waiting (timeout or a dropped
  /// future). If the owner had already been notified, the wake-up is passed on.
  pub(crate) fn abandon_receiver(&self, cell: &Arc<WaitCell>) {
    let mut guard = self.state.lock();
    guard.parked_receivers.retain(|c| !Arc::ptr_eq(c, cell));
    guard.wake_receiver_for_item(self.capacity);
  }

  /// Removes a sender slot whose owner stopped waiting, returning the item if
  /// it was still parked in the slot.
  pub(crate) fn abandon_sender(&self, cell: &Arc<WaitCell>) -> Option<T> {
    let mut guard = self.state.lock();
    let mut reclaimed = None;
    if let Some(pos) = guard
      .parked_senders
      .iter()
      .position(|p| Arc::ptr_eq(&p.cell, cell))
    {
      if let Some(mut parked) = guard.parked_senders.remove(pos) {
        reclaimed = parked.item.take();
      }
    }
    guard.wake_sender_for_room(self.capacity);
    reclaimed
  }

  pub(crate) fn add_observer(&self, signal: &Arc<Signal>) {
    let mut guard = self.state.lock();
    if !guard.observers.iter().any(|s| Arc::ptr_eq(s, signal)) {
      guard.observers.push(Arc::clone(signal));
    }
  }

  pub(crate) fn remove_observer(&self, signal: &Arc<Signal>) {
    self
      .state
      .lock()
      .observers
      .retain(|s| !Arc::ptr_eq(s, signal));
  }

  pub(crate) fn len(&self) -> usize {
    let guard = self.state.lock();
    guard.buffer.len()
      + guard
        .parked_senders
        .iter()
        .filter(|p| p.item.is_some())
        .count()
  }
}
