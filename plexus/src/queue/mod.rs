// src/queue/mod.rs

//! A lock-based MPMC queue with explicit, owner-driven close.
//!
//! This is the queue every other part of the crate composes. Its lifetime has
//! three states: open-empty, open-nonempty and closed. Unlike most Rust
//! channels, dropping handles never closes it; the producer that owns the queue
//! calls [`Queue::close`] when it is done. A closed queue still yields the items
//! it buffered before the close, and only reports `Closed` once drained.
//!
//! A single cloneable [`Queue`] handle can send, receive and close, from
//! threads (`send`/`recv`) or from async tasks (`send_async`/`recv_async`), and
//! both styles interoperate on the same queue.
//!
//! A capacity of `0` creates a "rendezvous" queue: a send only completes once a
//! receiver takes the item.

use crate::error::{CloseError, RecvError, RecvTimeoutError, SendError, TryRecvError, TrySendError};
use crate::select::Signal;

pub use async_impl::{RecvFuture, RecvStream, SendFuture};
pub use backoff::Backoff;
pub(crate) use sync_impl::{send_watched, Forwarded};

mod async_impl;
pub(crate) mod backoff;
mod core;
mod sync_impl;
mod waiter;

use self::core::{QueueShared, UNBOUNDED};
use ::core::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A handle to a queue. Cloning the handle does not clone the queue.
pub struct Queue<T> {
  pub(crate) shared: Arc<QueueShared<T>>,
}

// --- Constructors ---

/// Creates a queue that buffers up to `capacity` items.
///
/// A capacity of `0` creates a rendezvous queue, where `send` blocks until a
/// `recv` is ready to take the value.
pub fn bounded<T: Send>(capacity: usize) -> Queue<T> {
  Queue {
    shared: Arc::new(QueueShared::new(capacity)),
  }
}

/// Creates a queue bounded only by available memory.
pub fn unbounded<T: Send>() -> Queue<T> {
  bounded(UNBOUNDED)
}

impl<T> Clone for Queue<T> {
  fn clone(&self) -> Self {
    Queue {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> fmt::Debug for Queue<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("Queue");
    if self.shared.capacity == UNBOUNDED {
      s.field("capacity", &"unbounded");
    } else {
      s.field("capacity", &self.shared.capacity);
    }
    s.field("closed", &self.shared.is_closed_hint()).finish_non_exhaustive()
  }
}

impl<T: Send> Queue<T> {
  /// Sends a value, blocking the current thread while the queue is full.
  ///
  /// # Errors
  ///
  /// Returns `Err(SendError::Closed)` if the queue is closed before the value
  /// could be delivered.
  pub fn send(&self, item: T) -> Result<(), SendError> {
    sync_impl::send_sync(self, item)
  }

  /// Attempts to send a value without blocking. The value is handed back on
  /// failure.
  pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
    self.shared.try_send_core(item)
  }

  /// Receives a value, blocking the current thread while the queue is empty.
  ///
  /// # Errors
  ///
  /// Returns `Err(RecvError::Closed)` once the queue is closed and drained.
  pub fn recv(&self) -> Result<T, RecvError> {
    sync_impl::recv_sync(self)
  }

  /// Attempts to receive a value without blocking.
  pub fn try_recv(&self) -> Result<T, TryRecvError> {
    self.shared.try_recv_core()
  }

  /// Receives a value, blocking for at most `timeout`.
  pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
    sync_impl::recv_timeout_sync(self, timeout)
  }

  /// Sends a value asynchronously. The future resolves once the queue has
  /// accepted the value.
  pub fn send_async(&self, item: T) -> SendFuture<'_, T> {
    SendFuture::new(self, item)
  }

  /// Receives a value asynchronously.
  pub fn recv_async(&self) -> RecvFuture<'_, T> {
    RecvFuture::new(self)
  }

  /// Returns a stream over the queue's items, holding its own handle.
  pub fn stream(&self) -> RecvStream<T> {
    RecvStream::new(self.clone())
  }

  /// Converts this handle into a stream over the queue's items.
  pub fn into_stream(self) -> RecvStream<T> {
    RecvStream::new(self)
  }
}

impl<T> Queue<T> {
  /// Closes the queue.
  ///
  /// Buffered items stay receivable. Parked receivers are woken to drain them,
  /// and parked senders fail with `SendError::Closed`.
  ///
  /// # Errors
  ///
  /// Returns `Err(CloseError)` if the queue was already closed.
  pub fn close(&self) -> Result<(), CloseError> {
    if self.shared.close_core() {
      Ok(())
    } else {
      Err(CloseError)
    }
  }

  /// Returns `true` if the queue has been closed.
  ///
  /// This is a lock-free snapshot. A `true` answer is permanent; a `false`
  /// answer may already be stale when it is returned.
  pub fn is_closed(&self) -> bool {
    self.shared.is_closed_hint()
  }

  /// Number of items currently waiting to be received, including items held
  /// by parked rendezvous senders.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  /// Returns `true` if no item is waiting to be received.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The queue's capacity, or `None` if it is unbounded.
  pub fn capacity(&self) -> Option<usize> {
    if self.shared.capacity == UNBOUNDED {
      None
    } else {
      Some(self.shared.capacity)
    }
  }

  /// Returns `true` if both handles refer to the same queue.
  pub fn same_queue(&self, other: &Queue<T>) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }

  pub(crate) fn add_observer(&self, signal: &Arc<Signal>) {
    self.shared.add_observer(signal);
  }

  pub(crate) fn remove_observer(&self, signal: &Arc<Signal>) {
    self.shared.remove_observer(signal);
  }
}
