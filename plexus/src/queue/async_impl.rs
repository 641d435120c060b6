// src/queue/async_impl.rs
//! Future-based send and receive for [`Queue`].

use futures_core::Stream;

use super::core::QueueShared;
use super::waiter::{ParkedSender, WaitCell, TAKEN};
use super::Queue;
use crate::error::{RecvError, SendError, TryRecvError, TrySendError};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

// --- SendFuture ---

/// A future that completes when a value has been accepted by the queue.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct SendFuture<'a, T: Send> {
  queue: &'a Queue<T>,
  item: Option<T>,
  cell: Option<Arc<WaitCell>>,
}

// The item is moved in and out by value and never pinned.
impl<T: Send> Unpin for SendFuture<'_, T> {}

impl<'a, T: Send> SendFuture<'a, T> {
  pub(super) fn new(queue: &'a Queue<T>, item: T) -> Self {
    Self {
      queue,
      item: Some(item),
      cell: None,
    }
  }
}

impl<T: Send> Future for SendFuture<'_, T> {
  type Output = Result<(), SendError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = &mut *self;
    let shared = &this.queue.shared;

    loop {
      // --- Phase 0: Resolve an earlier park ---
      if let Some(cell) = this.cell.as_ref() {
        if !cell.is_done() {
          cell.register(cx.waker());
          if !cell.is_done() {
            return Poll::Pending;
          }
        }
        let outcome = cell.state();
        this.cell = None;
        if shared.is_rendezvous() {
          return Poll::Ready(if outcome == TAKEN {
            Ok(())
          } else {
            Err(SendError::Closed)
          });
        }
      }

      // --- Phase 1: Try to send without parking ---
      let item = match this.item.take() {
        Some(item) => item,
        None => return Poll::Ready(Ok(())),
      };
      match shared.try_send_core(item) {
        Ok(()) => return Poll::Ready(Ok(())),
        Err(TrySendError::Closed(_)) => return Poll::Ready(Err(SendError::Closed)),
        Err(TrySendError::Full(returned)) => this.item = Some(returned),
      }

      // --- Phase 2: Lock, re-check, and commit to parking ---
      let mut guard = shared.state.lock();
      if guard.closed {
        this.item = None;
        return Poll::Ready(Err(SendError::Closed));
      }
      if guard.has_room(shared.capacity) {
        drop(guard);
        continue;
      }

      let cell = WaitCell::for_task(cx.waker());
      let parked_item = if shared.is_rendezvous() {
        this.item.take()
      } else {
        None
      };
      let has_parked_item = parked_item.is_some();
      guard.parked_senders.push_back(ParkedSender {
        cell: Arc::clone(&cell),
        item: parked_item,
      });
      if has_parked_item {
        guard.notify_observers();
      }
      this.cell = Some(cell);
      return Poll::Pending;
    }
  }
}

impl<T: Send> Drop for SendFuture<'_, T> {
  fn drop(&mut self) {
    if let Some(cell) = self.cell.take() {
      // Dropping the future cancels the send; a still-parked item is discarded.
      drop(self.queue.shared.abandon_sender(&cell));
    }
  }
}

// --- RecvFuture ---

/// A future that completes with the next item of the queue, or with
/// `RecvError::Closed` once the queue is closed and drained.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub struct RecvFuture<'a, T: Send> {
  queue: &'a Queue<T>,
  cell: Option<Arc<WaitCell>>,
}

impl<'a, T: Send> RecvFuture<'a, T> {
  pub(super) fn new(queue: &'a Queue<T>) -> Self {
    Self { queue, cell: None }
  }
}

impl<T: Send> Future for RecvFuture<'_, T> {
  type Output = Result<T, RecvError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = &mut *self;
    poll_recv(&this.queue.shared, &mut this.cell, cx)
  }
}

impl<T: Send> Drop for RecvFuture<'_, T> {
  fn drop(&mut self) {
    if let Some(cell) = self.cell.take() {
      self.queue.shared.abandon_receiver(&cell);
    }
  }
}

// --- RecvStream ---

/// A [`Stream`] over the items of a queue. Ends once the queue is closed and
/// drained.
#[must_use = "streams do nothing unless polled"]
#[derive(Debug)]
pub struct RecvStream<T: Send> {
  queue: Queue<T>,
  cell: Option<Arc<WaitCell>>,
}

impl<T: Send> RecvStream<T> {
  pub(super) fn new(queue: Queue<T>) -> Self {
    Self { queue, cell: None }
  }
}

impl<T: Send> Stream for RecvStream<T> {
  type Item = T;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = &mut *self;
    match poll_recv(&this.queue.shared, &mut this.cell, cx) {
      Poll::Ready(Ok(value)) => Poll::Ready(Some(value)),
      Poll::Ready(Err(_)) => Poll::Ready(None),
      Poll::Pending => Poll::Pending,
    }
  }
}

impl<T: Send> Drop for RecvStream<T> {
  fn drop(&mut self) {
    if let Some(cell) = self.cell.take() {
      self.queue.shared.abandon_receiver(&cell);
    }
  }
}

/// Shared receive state machine for `RecvFuture` and `RecvStream`.
fn poll_recv<T>(
  shared: &QueueShared<T>,
  cell_slot: &mut Option<Arc<WaitCell>>,
  cx: &mut Context<'_>,
) -> Poll<Result<T, RecvError>> {
  loop {
    if let Some(cell) = cell_slot.as_ref() {
      if !cell.is_done() {
        cell.register(cx.waker());
        if !cell.is_done() {
          // Still parked, but an item may have arrived through a path that
          // does not pop receivers (e.g. a rendezvous sender parking).
          match shared.try_recv_core() {
            Ok(item) => {
              if let Some(cell) = cell_slot.take() {
                shared.abandon_receiver(&cell);
              }
              return Poll::Ready(Ok(item));
            }
            Err(TryRecvError::Closed) => {
              if let Some(cell) = cell_slot.take() {
                shared.abandon_receiver(&cell);
              }
              return Poll::Ready(Err(RecvError::Closed));
            }
            Err(TryRecvError::Empty) => return Poll::Pending,
          }
        }
      }
      // Notified: the cell is no longer in the queue.
      *cell_slot = None;
    }

    match shared.try_recv_core() {
      Ok(item) => return Poll::Ready(Ok(item)),
      Err(TryRecvError::Closed) => return Poll::Ready(Err(RecvError::Closed)),
      Err(TryRecvError::Empty) => {}
    }

    let mut guard = shared.state.lock();
    if guard.closed || guard.has_item(shared.capacity) {
      drop(guard);
      continue;
    }
    let cell = WaitCell::for_task(cx.waker());
    guard.parked_receivers.push_back(Arc::clone(&cell));
    guard.notify_observers();
    *cell_slot = Some(cell);
    return Poll::Pending;
  }
}
