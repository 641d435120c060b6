// src/error.rs

//! Probe statuses and the error types of queue and session operations.

use core::fmt;
use std::io;

/// The outcome of a non-blocking queue operation.
///
/// `Closed` is terminal: once a probe on a queue observes it, every later probe
/// on the same queue observes it too. `Blocked` is transient and only means the
/// queue could not accept or yield an item at the instant it was probed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Status {
  /// The queue accepted the send or produced an item without blocking.
  Ok,
  /// The queue is closed (and, for receives, drained). This never reverts.
  Closed,
  /// The queue is not ready: its buffer is full or empty, or, for a
  /// rendezvous queue, nobody is waiting on the other end.
  Blocked,
}

impl Status {
  /// Returns `true` for `Ok` and `Closed`, the statuses a retry loop stops on.
  #[inline]
  pub fn is_terminal(self) -> bool {
    !matches!(self, Status::Blocked)
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::Ok => f.write_str("Ok"),
      Status::Closed => f.write_str("Closed"),
      Status::Blocked => f.write_str("Blocked"),
    }
  }
}

macro_rules! impl_error_for_enum_with_inner {
  (
    $enum_name:ident < $generic_param:ident >,
    $($variant:ident ( $message:expr ) ),+
    $(,)?
  ) => {
    impl<$generic_param> $enum_name<$generic_param> {
      /// Consumes the error, returning the item that could not be sent.
      #[inline]
      pub fn into_inner(self) -> $generic_param {
        match self {
          $( $enum_name::$variant(v) => v, )+
        }
      }
    }

    impl<$generic_param> fmt::Display for $enum_name<$generic_param> {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
          $( $enum_name::$variant(_) => f.write_str($message), )+
        }
      }
    }

    impl<$generic_param> std::error::Error for $enum_name<$generic_param> {}
  };
}

/// Error returned by `try_send` when the item could not be queued immediately.
/// The item is handed back to the caller.
#[derive(PartialEq, Eq, Clone)]
pub enum TrySendError<T> {
  /// The queue is full, or it is a rendezvous queue with no waiting receiver.
  Full(T),
  /// The queue has been closed.
  Closed(T),
}

impl<T> TrySendError<T> {
  /// Returns `true` if the queue was closed.
  #[inline]
  pub fn is_closed(&self) -> bool {
    matches!(self, TrySendError::Closed(_))
  }
}

impl<T> fmt::Debug for TrySendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendError::Full(_) => write!(f, "TrySendError::Full(..)"),
      TrySendError::Closed(_) => write!(f, "TrySendError::Closed(..)"),
    }
  }
}

impl_error_for_enum_with_inner!(
  TrySendError<T>,
  Full("queue full"),
  Closed("queue closed"),
);

/// Error returned by blocking and async `send` operations.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SendError {
  /// The queue was closed before the item could be delivered.
  Closed,
}
impl std::error::Error for SendError {}
impl fmt::Display for SendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendError::Closed => write!(f, "queue closed"),
    }
  }
}

/// Error returned by `try_recv` when no item could be taken immediately.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// The queue is open but holds no item.
  Empty,
  /// The queue is closed and fully drained.
  Closed,
}
impl std::error::Error for TryRecvError {}
impl fmt::Display for TryRecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvError::Empty => write!(f, "queue empty"),
      TryRecvError::Closed => write!(f, "queue closed and drained"),
    }
  }
}

/// Error returned by blocking and async `recv` operations.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvError {
  /// The queue is closed and fully drained.
  Closed,
}
impl std::error::Error for RecvError {}
impl fmt::Display for RecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvError::Closed => write!(f, "queue closed and drained"),
    }
  }
}

/// Error returned by `recv_timeout`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvTimeoutError {
  /// The queue is closed and fully drained.
  Closed,
  /// The timeout elapsed before an item arrived.
  Timeout,
}
impl std::error::Error for RecvTimeoutError {}
impl fmt::Display for RecvTimeoutError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvTimeoutError::Closed => write!(f, "queue closed and drained"),
      RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
    }
  }
}

/// Error returned when attempting to close an already closed queue.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CloseError;
impl std::error::Error for CloseError {}
impl fmt::Display for CloseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "queue is already closed")
  }
}

/// A value was sent through an [`ErasedQueue`](crate::erased::ErasedQueue)
/// whose element type does not match.
///
/// This is a programming error. It is reported at the call site and is never
/// confused with [`Status::Closed`] or [`Status::Blocked`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ContractViolation {
  /// Element type of the queue.
  pub expected: &'static str,
  /// Type of the value that was offered.
  pub found: &'static str,
}
impl std::error::Error for ContractViolation {}
impl fmt::Display for ContractViolation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "cannot send a value of type `{}` on a queue of `{}`",
      self.found, self.expected
    )
  }
}

/// The operating system refused to start a session's background thread.
#[derive(Debug)]
pub struct SpawnError(pub(crate) io::Error);

impl SpawnError {
  /// The underlying I/O error.
  pub fn io_error(&self) -> &io::Error {
    &self.0
  }
}
impl std::error::Error for SpawnError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.0)
  }
}
impl fmt::Display for SpawnError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "failed to spawn session thread: {}", self.0)
  }
}

/// The background thread of a session panicked.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SessionPanicked;
impl std::error::Error for SessionPanicked {}
impl fmt::Display for SessionPanicked {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "session thread panicked")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_display() {
    assert_eq!(Status::Ok.to_string(), "Ok");
    assert_eq!(Status::Closed.to_string(), "Closed");
    assert_eq!(Status::Blocked.to_string(), "Blocked");
    assert!(Status::Closed.is_terminal());
    assert!(!Status::Blocked.is_terminal());
  }

  #[test]
  fn try_send_error_hands_item_back() {
    let err = TrySendError::Full(7);
    assert!(!err.is_closed());
    assert_eq!(err.to_string(), "queue full");
    assert_eq!(err.into_inner(), 7);
    assert_eq!(TrySendError::Closed("x").into_inner(), "x");
  }

  #[test]
  fn contract_violation_names_both_types() {
    let err = ContractViolation {
      expected: "alloc::string::String",
      found: "i32",
    };
    let msg = err.to_string();
    assert!(msg.contains("i32"));
    assert!(msg.contains("alloc::string::String"));
  }
}
