#![allow(dead_code)]

use plexus::{Queue, Session};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(500);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
pub const STRESS_TIMEOUT: Duration = Duration::from_secs(15);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_MEDIUM: usize = 200;
pub const ITEMS_HIGH: usize = 1000;

/// Sleeps for `delay`, sends `item` on `queue`, then closes it.
pub fn sleep_send_close<T: Send + 'static>(
  queue: Queue<T>,
  item: T,
  delay: Duration,
) -> JoinHandle<()> {
  thread::spawn(move || {
    thread::sleep(delay);
    queue.send(item).unwrap();
    queue.close().unwrap();
  })
}

/// Receives until the queue is closed and drained, failing the test if that
/// takes longer than `timeout` between two items.
pub fn drain_within<T: Send>(queue: &Queue<T>, timeout: Duration) -> Vec<T> {
  let mut items = Vec::new();
  loop {
    match queue.recv_timeout(timeout) {
      Ok(item) => items.push(item),
      Err(plexus::RecvTimeoutError::Closed) => return items,
      Err(plexus::RecvTimeoutError::Timeout) => panic!("queue did not close within {:?}", timeout),
    }
  }
}

/// Polls until the session's thread has exited. Returns `false` on timeout.
pub fn finished_within(session: &Session, timeout: Duration) -> bool {
  let deadline = Instant::now() + timeout;
  while !session.is_finished() {
    if Instant::now() >= deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(1));
  }
  true
}
