//! Blocking send and receive for [`Queue`].

use super::backoff;
use super::waiter::{ParkedSender, WaitCell, TAKEN};
use super::Queue;
use crate::error::{RecvError, RecvTimeoutError, SendError, TryRecvError, TrySendError};
use crate::select::Signal;

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sends `item`, parking the current thread while the queue is full.
///
/// On a rendezvous queue the item is parked together with the thread and the
/// call returns once a receiver has taken it.
pub(crate) fn send_sync<T: Send>(queue: &Queue<T>, item: T) -> Result<(), SendError> {
  let shared = &queue.shared;
  let mut item = item;

  loop {
    // --- Phase 1: Attempt a non-blocking send ---
    match shared.try_send_core(item) {
      Ok(()) => return Ok(()),
      Err(TrySendError::Closed(_)) => return Err(SendError::Closed),
      Err(TrySendError::Full(returned)) => item = returned,
    }

    // --- Phase 2: Lock, re-check, and commit to parking ---
    let cell = WaitCell::for_thread();
    let mut guard = shared.state.lock();
    if guard.closed {
      return Err(SendError::Closed);
    }
    if guard.has_room(shared.capacity) {
      drop(guard);
      continue;
    }

    if shared.is_rendezvous() {
      guard.parked_senders.push_back(ParkedSender {
        cell: Arc::clone(&cell),
        item: Some(item),
      });
      // A parked item is something a prober can take.
      guard.notify_observers();
      drop(guard);

      backoff::adaptive_wait(|| cell.is_done());
      return if cell.state() == TAKEN {
        Ok(())
      } else {
        Err(SendError::Closed)
      };
    }

    guard.parked_senders.push_back(ParkedSender {
      cell: Arc::clone(&cell),
      item: None,
    });
    drop(guard);

    // --- Phase 3: Wait, then loop to retry with the item still in hand ---
    backoff::adaptive_wait(|| cell.is_done());
  }
}

/// Receives an item, parking the current thread while the queue is empty.
pub(crate) fn recv_sync<T: Send>(queue: &Queue<T>) -> Result<T, RecvError> {
  let shared = &queue.shared;
  loop {
    match shared.try_recv_core() {
      Ok(item) => return Ok(item),
      Err(TryRecvError::Closed) => return Err(RecvError::Closed),
      Err(TryRecvError::Empty) => {}
    }

    let cell = WaitCell::for_thread();
    {
      let mut guard = shared.state.lock();
      if guard.closed || guard.has_item(shared.capacity) {
        continue;
      }
      guard.parked_receivers.push_back(Arc::clone(&cell));
      // A parked receiver makes a rendezvous send possible.
      guard.notify_observers();
    }

    backoff::adaptive_wait(|| cell.is_done());
  }
}

/// Receives an item, giving up after `timeout`.
pub(crate) fn recv_timeout_sync<T: Send>(
  queue: &Queue<T>,
  timeout: Duration,
) -> Result<T, RecvTimeoutError> {
  let shared = &queue.shared;
  // Too far out to represent: no deadline at all.
  let Some(deadline) = Instant::now().checked_add(timeout) else {
    return recv_sync(queue).map_err(|_| RecvTimeoutError::Closed);
  };

  loop {
    match shared.try_recv_core() {
      Ok(item) => return Ok(item),
      Err(TryRecvError::Closed) => return Err(RecvTimeoutError::Closed),
      Err(TryRecvError::Empty) => {}
    }

    let remaining = match deadline.checked_duration_since(Instant::now()) {
      Some(d) if !d.is_zero() => d,
      _ => return Err(RecvTimeoutError::Timeout),
    };

    let cell = WaitCell::for_thread();
    {
      let mut guard = shared.state.lock();
      if guard.closed || guard.has_item(shared.capacity) {
        continue;
      }
      guard.parked_receivers.push_back(Arc::clone(&cell));
      guard.notify_observers();
    }

    if !backoff::adaptive_wait_timeout(|| cell.is_done(), remaining) {
      shared.abandon_receiver(&cell);
      return match shared.try_recv_core() {
        Ok(item) => Ok(item),
        Err(TryRecvError::Closed) => Err(RecvTimeoutError::Closed),
        Err(TryRecvError::Empty) => Err(RecvTimeoutError::Timeout),
      };
    }
  }
}

/// Outcome of [`send_watched`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Forwarded {
  Sent,
  Closed,
  Interrupted,
}

/// Sends `item`, waiting on `signal` instead of parking the thread, and gives
/// up as soon as `interrupted` returns `true`.
///
/// The caller must have registered `signal` as an observer of the queue (and
/// of whatever `interrupted` looks at). An item given up on is dropped.
pub(crate) fn send_watched<T, F>(
  queue: &Queue<T>,
  item: T,
  signal: &Arc<Signal>,
  interrupted: F,
) -> Forwarded
where
  T: Send,
  F: Fn() -> bool,
{
  let shared = &queue.shared;
  let mut item = item;

  loop {
    if interrupted() {
      return Forwarded::Interrupted;
    }
    match shared.try_send_core(item) {
      Ok(()) => return Forwarded::Sent,
      Err(TrySendError::Closed(_)) => return Forwarded::Closed,
      Err(TrySendError::Full(returned)) => item = returned,
    }

    if !shared.is_rendezvous() {
      // Every pop raises the observers, so the signal is enough to wait on.
      signal.wait();
      continue;
    }

    let cell = WaitCell::for_signal(signal);
    {
      let mut guard = shared.state.lock();
      if guard.closed {
        return Forwarded::Closed;
      }
      if guard.has_room(shared.capacity) {
        continue;
      }
      guard.parked_senders.push_back(ParkedSender {
        cell: Arc::clone(&cell),
        item: Some(item),
      });
      guard.notify_observers();
    }

    loop {
      if cell.is_done() {
        return if cell.state() == TAKEN {
          Forwarded::Sent
        } else {
          Forwarded::Closed
        };
      }
      if interrupted() {
        if shared.abandon_sender(&cell).is_some() {
          return Forwarded::Interrupted;
        }
        // Lost the race: a receiver or a close got to the slot first.
        return if cell.state() == TAKEN {
          Forwarded::Sent
        } else {
          Forwarded::Closed
        };
      }
      signal.wait();
    }
  }
}
