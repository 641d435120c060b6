//! Background thread ownership for fan-in and fan-out sessions.

use crate::error::{SessionPanicked, SpawnError};
use crate::telemetry;

use std::fmt;
use std::thread::{self, JoinHandle};

/// The background thread of a fan-in or fan-out session.
///
/// The thread exits on its own once the session terminates: when its inputs
/// close, or for a fan-in, when it is cancelled. Its output queues are closed
/// on every exit path, panics included, before the thread finishes. Dropping
/// a `Session` detaches the thread.
pub struct Session {
  handle: Option<JoinHandle<()>>,
}

impl Session {
  /// A session that never had a thread, e.g. a fan-in over zero inputs.
  pub(crate) fn finished() -> Self {
    Session { handle: None }
  }

  pub(crate) fn spawn<F>(
    name: Option<&str>,
    kind: &'static str,
    body: F,
  ) -> Result<Self, SpawnError>
  where
    F: FnOnce() + Send + 'static,
  {
    let mut builder = thread::Builder::new();
    if let Some(name) = name {
      builder = builder.name(name.to_owned());
    }
    let handle = builder.spawn(body).map_err(SpawnError)?;
    log::debug!("{} session started on {:?}", kind, handle.thread().name());
    telemetry::increment_counter("session::spawn", kind);
    Ok(Session {
      handle: Some(handle),
    })
  }

  /// Returns `true` once the background thread has exited, or if there never
  /// was one.
  pub fn is_finished(&self) -> bool {
    self.handle.as_ref().map_or(true, JoinHandle::is_finished)
  }

  /// Waits for the background thread to exit.
  ///
  /// # Errors
  ///
  /// Returns `Err(SessionPanicked)` if the thread panicked. Its outputs were
  /// still closed.
  pub fn join(mut self) -> Result<(), SessionPanicked> {
    match self.handle.take() {
      Some(handle) => handle.join().map_err(|_| SessionPanicked),
      None => Ok(()),
    }
  }
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("finished", &self.is_finished())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn finished_session_joins_immediately() {
    let session = Session::finished();
    assert!(session.is_finished());
    assert_eq!(session.join(), Ok(()));
  }

  #[test]
  fn spawned_session_reports_completion() {
    let session = Session::spawn(Some("plexus-test"), "test", || {
      assert_eq!(thread::current().name(), Some("plexus-test"));
      thread::sleep(Duration::from_millis(10));
    })
    .unwrap();
    assert_eq!(session.join(), Ok(()));
  }

  #[test]
  fn panicking_session_is_reported() {
    let session = Session::spawn(None, "test", || panic!("boom")).unwrap();
    assert_eq!(session.join(), Err(SessionPanicked));
  }
}
