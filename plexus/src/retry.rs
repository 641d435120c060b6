// src/retry.rs

//! Retry-until-ready combinators over [`Probe`].
//!
//! Both loops re-probe while the queue reports `Blocked`, running the caller's
//! `fallback` between attempts. The fallback decides the backoff policy: it may
//! spin, yield, sleep, do unrelated work or block. There is no internal
//! timeout. A caller that needs a deadline makes the fallback observe one and
//! arranges for the queue to close.

use crate::probe::{Probe, RecvProbe, SendProbe};

/// Receives an item, running `fallback` whenever the queue is empty.
///
/// Returns `Some(item)` once one is available and `None` once the queue is
/// closed and drained. `fallback` is never run after either outcome.
pub fn recv_or_else<P, F>(queue: &P, mut fallback: F) -> Option<P::Item>
where
  P: Probe + ?Sized,
  F: FnMut(),
{
  loop {
    match queue.probe_recv() {
      RecvProbe::Ok(item) => return Some(item),
      RecvProbe::Closed => return None,
      RecvProbe::Blocked => fallback(),
    }
  }
}

/// Sends `item`, running `fallback` whenever the queue cannot accept it.
///
/// Returns `Ok(true)` once delivered and `Ok(false)` if the queue is closed, in
/// which case the item is dropped. `fallback` is never run after either
/// outcome.
///
/// # Errors
///
/// Returns the queue's contract-violation error on the first attempt that
/// reports one. It is never retried.
pub fn send_or_else<P, F>(queue: &P, item: P::Item, mut fallback: F) -> Result<bool, P::Error>
where
  P: Probe + ?Sized,
  F: FnMut(),
{
  let mut item = item;
  loop {
    match queue.probe_send(item)? {
      SendProbe::Ok => return Ok(true),
      SendProbe::Closed(_) => return Ok(false),
      SendProbe::Blocked(returned) => {
        item = returned;
        fallback();
      }
    }
  }
}
