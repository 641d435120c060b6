//! Wait strategies: the internal adaptive park used by blocking queue operations,
//! and a public [`Backoff`] meant to be handed to the retry combinators as their
//! fallback action.

use std::thread;
use std::time::Duration;

const SPIN_LIMIT: u32 = 10;
const YIELD_LIMIT: u32 = 30;
const MAX_SLEEP: Duration = Duration::from_millis(1);

/// Emits a CPU instruction that signals the processor that it is in a spin loop.
#[inline(always)]
fn spin_hint() {
  std::hint::spin_loop();
}

/// An adaptive wait strategy that starts with spinning, then yields, then parks.
///
/// The caller must arrange for the parked thread to be unparked once `cond`
/// turns true.
pub(crate) fn adaptive_wait<F>(cond: F)
where
  F: Fn() -> bool,
{
  // 1. Spinning Phase
  for _ in 0..SPIN_LIMIT {
    if cond() {
      return;
    }
    spin_hint();
  }

  // 2. Yielding Phase
  for _ in SPIN_LIMIT..YIELD_LIMIT {
    if cond() {
      return;
    }
    thread::yield_now();
  }

  // 3. Blocking Phase
  while !cond() {
    thread::park();
  }
}

/// Same as [`adaptive_wait`] but gives up once `timeout` has elapsed.
/// Returns whether `cond` was observed true.
pub(crate) fn adaptive_wait_timeout<F>(cond: F, timeout: Duration) -> bool
where
  F: Fn() -> bool,
{
  let Some(deadline) = std::time::Instant::now().checked_add(timeout) else {
    adaptive_wait(cond);
    return true;
  };
  for _ in 0..SPIN_LIMIT {
    if cond() {
      return true;
    }
    spin_hint();
  }
  loop {
    if cond() {
      return true;
    }
    let now = std::time::Instant::now();
    if now >= deadline {
      return false;
    }
    thread::park_timeout(deadline - now);
  }
}

/// A progressive backoff for hand-written polling loops.
///
/// Spins first, then yields the thread, then sleeps for short, growing
/// intervals capped at one millisecond. Intended as the fallback of
/// [`recv_or_else`](crate::retry::recv_or_else) and
/// [`send_or_else`](crate::retry::send_or_else):
///
/// ```
/// use plexus::{queue, retry, Backoff};
///
/// let q = queue::bounded::<u32>(1);
/// q.try_send(5).unwrap();
/// let mut backoff = Backoff::new();
/// assert_eq!(retry::recv_or_else(&q, || backoff.snooze()), Some(5));
/// ```
#[derive(Debug, Default, Clone)]
pub struct Backoff {
  step: u32,
}

impl Backoff {
  /// Creates a backoff at its first (spinning) step.
  pub fn new() -> Self {
    Self { step: 0 }
  }

  /// Waits for a little longer than the previous call did.
  pub fn snooze(&mut self) {
    if self.step < SPIN_LIMIT {
      for _ in 0..(1 << self.step.min(6)) {
        spin_hint();
      }
    } else if self.step < YIELD_LIMIT {
      thread::yield_now();
    } else {
      let micros = 1u64 << (self.step - YIELD_LIMIT).min(10);
      thread::sleep(Duration::from_micros(micros).min(MAX_SLEEP));
    }
    self.step = self.step.saturating_add(1);
  }

  /// Returns `true` once the backoff has progressed past spinning and yielding.
  pub fn is_sleeping(&self) -> bool {
    self.step >= YIELD_LIMIT
  }

  /// Starts over from the spinning step.
  pub fn reset(&mut self) {
    self.step = 0;
  }
}
