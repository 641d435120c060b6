//! Non-blocking probe operations.
//!
//! A probe never parks the caller. It reports one of three outcomes, see
//! [`Status`]: the operation completed, the queue is permanently closed, or the
//! queue is transiently not ready. The [`Probe`] trait is implemented for typed
//! [`Queue`]s and for type-erased [`ErasedQueue`](crate::erased::ErasedQueue)s,
//! and the free functions in this module work with either.

use crate::error::{Status, TryRecvError, TrySendError};
use crate::queue::Queue;

use std::convert::Infallible;

/// Outcome of a non-blocking receive.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RecvProbe<T> {
  /// An item was immediately available.
  Ok(T),
  /// The queue is closed and drained. Every later probe returns this too.
  Closed,
  /// The queue is open but currently empty.
  Blocked,
}

impl<T> RecvProbe<T> {
  /// Projects the outcome onto a [`Status`].
  #[inline]
  pub fn status(&self) -> Status {
    match self {
      RecvProbe::Ok(_) => Status::Ok,
      RecvProbe::Closed => Status::Closed,
      RecvProbe::Blocked => Status::Blocked,
    }
  }

  /// The received item, if any.
  #[inline]
  pub fn into_item(self) -> Option<T> {
    match self {
      RecvProbe::Ok(item) => Some(item),
      _ => None,
    }
  }

  /// Maps the received item, keeping the status.
  pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RecvProbe<U> {
    match self {
      RecvProbe::Ok(item) => RecvProbe::Ok(f(item)),
      RecvProbe::Closed => RecvProbe::Closed,
      RecvProbe::Blocked => RecvProbe::Blocked,
    }
  }
}

impl<T> From<Result<T, TryRecvError>> for RecvProbe<T> {
  fn from(result: Result<T, TryRecvError>) -> Self {
    match result {
      Ok(item) => RecvProbe::Ok(item),
      Err(TryRecvError::Closed) => RecvProbe::Closed,
      Err(TryRecvError::Empty) => RecvProbe::Blocked,
    }
  }
}

/// Outcome of a non-blocking send. The item is handed back unless it was
/// accepted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SendProbe<T> {
  /// The queue accepted the item.
  Ok,
  /// The queue is closed. Every later probe returns this too.
  Closed(T),
  /// The queue is full, or has no ready receiver if it is a rendezvous queue.
  Blocked(T),
}

impl<T> SendProbe<T> {
  /// Projects the outcome onto a [`Status`].
  #[inline]
  pub fn status(&self) -> Status {
    match self {
      SendProbe::Ok => Status::Ok,
      SendProbe::Closed(_) => Status::Closed,
      SendProbe::Blocked(_) => Status::Blocked,
    }
  }

  /// The rejected item, if the send did not go through.
  #[inline]
  pub fn into_rejected(self) -> Option<T> {
    match self {
      SendProbe::Ok => None,
      SendProbe::Closed(item) | SendProbe::Blocked(item) => Some(item),
    }
  }
}

impl<T> From<Result<(), TrySendError<T>>> for SendProbe<T> {
  fn from(result: Result<(), TrySendError<T>>) -> Self {
    match result {
      Ok(()) => SendProbe::Ok,
      Err(TrySendError::Closed(item)) => SendProbe::Closed(item),
      Err(TrySendError::Full(item)) => SendProbe::Blocked(item),
    }
  }
}

/// Non-blocking access to a queue.
pub trait Probe {
  /// The element type moved in and out of the queue.
  type Item;
  /// Error for sends that break the queue's contract, such as an element of
  /// the wrong type. `Infallible` for statically typed queues.
  type Error;

  /// Attempts to take an item without blocking.
  fn probe_recv(&self) -> RecvProbe<Self::Item>;

  /// Attempts to hand over an item without blocking.
  ///
  /// # Errors
  ///
  /// Returns `Err` only on a contract violation, never for a closed or full
  /// queue.
  fn probe_send(&self, item: Self::Item) -> Result<SendProbe<Self::Item>, Self::Error>;

  /// Closes the queue. Returns `true` only for the call that performed the
  /// open-to-closed transition.
  fn probe_close(&self) -> bool;

  /// Lock-free snapshot of the closed state. Only `true` is durable.
  fn probe_is_closed(&self) -> bool;
}

impl<T: Send> Probe for Queue<T> {
  type Item = T;
  type Error = Infallible;

  #[inline]
  fn probe_recv(&self) -> RecvProbe<T> {
    self.try_recv().into()
  }

  #[inline]
  fn probe_send(&self, item: T) -> Result<SendProbe<T>, Infallible> {
    Ok(self.try_send(item).into())
  }

  #[inline]
  fn probe_close(&self) -> bool {
    self.shared.close_core()
  }

  #[inline]
  fn probe_is_closed(&self) -> bool {
    self.is_closed()
  }
}

/// Attempts a receive without blocking.
#[inline]
pub fn try_recv<P: Probe + ?Sized>(queue: &P) -> RecvProbe<P::Item> {
  queue.probe_recv()
}

/// Attempts a send without blocking.
///
/// # Errors
///
/// Returns the queue's contract-violation error, e.g. a
/// [`ContractViolation`](crate::error::ContractViolation) when a value of the
/// wrong type is offered to an erased queue.
#[inline]
pub fn try_send<P: Probe + ?Sized>(
  queue: &P,
  item: P::Item,
) -> Result<SendProbe<P::Item>, P::Error> {
  queue.probe_send(item)
}

/// Ensures the queue is closed. Returns `true` if this call closed it, `false`
/// if it was already closed. Safe to race from several would-be owners.
#[inline]
pub fn try_close<P: Probe + ?Sized>(queue: &P) -> bool {
  queue.probe_close()
}

/// Returns `true` if the queue is closed. A `false` answer is only a hint.
#[inline]
pub fn is_closed<P: Probe + ?Sized>(queue: &P) -> bool {
  queue.probe_is_closed()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue;

  #[test]
  fn try_recv_outcomes() {
    let q = queue::bounded::<String>(1);
    assert_eq!(try_recv(&q), RecvProbe::Blocked);

    q.send("Hello".to_string()).unwrap();
    assert_eq!(try_recv(&q), RecvProbe::Ok("Hello".to_string()));
    assert_eq!(try_recv(&q).status(), Status::Blocked);

    q.close().unwrap();
    assert_eq!(try_recv(&q), RecvProbe::Closed);
  }

  #[test]
  fn try_send_outcomes() {
    let q = queue::bounded::<&str>(1);
    assert_eq!(try_send(&q, "Hello"), Ok(SendProbe::Ok));
    assert_eq!(try_send(&q, "oof"), Ok(SendProbe::Blocked("oof")));

    let unbuffered = queue::bounded::<&str>(0);
    assert_eq!(
      try_send(&unbuffered, "oof").map(|p| p.status()),
      Ok(Status::Blocked)
    );

    unbuffered.close().unwrap();
    let probe = try_send(&unbuffered, "yeet").unwrap();
    assert_eq!(probe.status(), Status::Closed);
    assert_eq!(probe.into_rejected(), Some("yeet"));
  }

  #[test]
  fn try_close_reports_transition_once() {
    let q = queue::unbounded::<()>();
    assert!(!is_closed(&q));
    assert!(try_close(&q));
    assert!(!try_close(&q));
    assert!(is_closed(&q));
  }

  #[test]
  fn closed_is_monotonic() {
    let q = queue::bounded::<u32>(4);
    q.send(1).unwrap();
    q.close().unwrap();
    assert_eq!(try_recv(&q), RecvProbe::Ok(1));
    for _ in 0..10 {
      assert_eq!(try_recv(&q).status(), Status::Closed);
      assert_eq!(try_send(&q, 2).unwrap().status(), Status::Closed);
      assert!(is_closed(&q));
    }
  }

  #[test]
  fn single_item_is_received_exactly_once() {
    let q = queue::bounded::<u8>(1);
    q.send(42).unwrap();
    assert_eq!(try_recv(&q).into_item(), Some(42));
    for _ in 0..5 {
      assert_eq!(try_recv(&q), RecvProbe::Blocked);
    }
    q.send(43).unwrap();
    assert_eq!(try_recv(&q).map(u32::from), RecvProbe::Ok(43u32));
  }
}
