// src/telemetry.rs

//! Opt-in event recording for sessions.
//!
//! With the `plexus_telemetry` feature, fan-in and fan-out sessions record
//! their lifecycle ([`EventKind`]) and a few counters into a process-wide
//! collector, which tests can inspect and humans can dump with
//! [`print_telemetry_report`]. Without the feature the recording functions
//! are empty and inlined away.

use std::fmt;

/// What happened in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
  /// The session thread started.
  Start,
  /// An item was delivered to an output.
  Forwarded,
  /// Cancellation fired while an item was waiting for output room. The item
  /// was dropped.
  ForwardInterrupted,
  /// An output was found closed by somebody other than the session.
  OutputClosed,
  /// An input closed and drained.
  SourceClosed,
  /// The session observed its cancellation.
  Cancelled,
  /// The session closed its outputs and is about to exit.
  Exit,
}

impl EventKind {
  /// A short, stable name.
  pub fn as_str(self) -> &'static str {
    match self {
      EventKind::Start => "Start",
      EventKind::Forwarded => "Forwarded",
      EventKind::ForwardInterrupted => "ForwardInterrupted",
      EventKind::OutputClosed => "OutputClosed",
      EventKind::SourceClosed => "SourceClosed",
      EventKind::Cancelled => "Cancelled",
      EventKind::Exit => "Exit",
    }
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(feature = "plexus_telemetry")]
mod enabled {
  use super::EventKind;

  use parking_lot::Mutex;
  use std::collections::{BTreeMap, HashMap};
  use std::fmt;
  use std::sync::atomic::{AtomicU64, Ordering};
  use std::thread::{self, ThreadId};
  use std::time::{Duration, Instant};

  /// One recorded event.
  #[derive(Debug, Clone)]
  pub struct SessionEvent {
    /// Order of recording across all sessions.
    pub seq: u64,
    /// Time since the collector was last cleared.
    pub at: Duration,
    /// Recording thread.
    pub thread: ThreadId,
    /// Name of the recording thread, if it has one.
    pub thread_name: Option<String>,
    /// Set when recorded from inside a Tokio task.
    pub task: Option<tokio::task::Id>,
    /// The session kind and role, e.g. `fan_in::merge`.
    pub session: &'static str,
    /// What happened.
    pub kind: EventKind,
    /// Input or output slot involved, if any.
    pub slot: Option<usize>,
    /// Free-form extra information.
    pub detail: Option<String>,
  }

  struct Collector {
    started: Instant,
    events: Vec<SessionEvent>,
    counters: HashMap<(&'static str, &'static str), usize>,
  }

  static SEQ: AtomicU64 = AtomicU64::new(0);

  lazy_static::lazy_static! {
    static ref COLLECTOR: Mutex<Collector> = Mutex::new(Collector {
      started: Instant::now(),
      events: Vec::new(),
      counters: HashMap::new(),
    });
  }

  /// Records an event for `session`. `detail` is only formatted here.
  pub fn log_event(
    slot: Option<usize>,
    session: &'static str,
    kind: EventKind,
    detail: Option<fmt::Arguments<'_>>,
  ) {
    let detail = detail.map(|args| args.to_string());
    let current = thread::current();
    let mut collector = COLLECTOR.lock();
    let event = SessionEvent {
      seq: SEQ.fetch_add(1, Ordering::Relaxed),
      at: collector.started.elapsed(),
      thread: current.id(),
      thread_name: current.name().map(str::to_owned),
      task: tokio::task::try_id(),
      session,
      kind,
      slot,
      detail,
    };
    collector.events.push(event);
  }

  /// Bumps `counter` of `session`.
  pub fn increment_counter(session: &'static str, counter: &'static str) {
    *COLLECTOR.lock().counters.entry((session, counter)).or_insert(0) += 1;
  }

  /// Every event recorded since the last clear, oldest first.
  pub fn events() -> Vec<SessionEvent> {
    let mut events = COLLECTOR.lock().events.clone();
    events.sort_by_key(|e| e.seq);
    events
  }

  /// Current value of a counter. Zero if it was never bumped.
  pub fn counter(session: &'static str, counter: &'static str) -> usize {
    COLLECTOR
      .lock()
      .counters
      .get(&(session, counter))
      .copied()
      .unwrap_or(0)
  }

  /// Forgets every event and counter.
  pub fn clear_telemetry() {
    let mut collector = COLLECTOR.lock();
    collector.events.clear();
    collector.counters.clear();
    collector.started = Instant::now();
    SEQ.store(0, Ordering::Relaxed);
  }

  /// Prints a per-session summary, the counters and the full timeline to
  /// stdout.
  pub fn print_telemetry_report() {
    let events = events();
    let collector = COLLECTOR.lock();

    println!("\n=== plexus telemetry ({} events) ===", events.len());

    let mut summary: BTreeMap<&'static str, BTreeMap<EventKind, usize>> = BTreeMap::new();
    for e in &events {
      *summary.entry(e.session).or_default().entry(e.kind).or_insert(0) += 1;
    }
    for (session, kinds) in &summary {
      let line: Vec<String> = kinds.iter().map(|(k, n)| format!("{}={}", k, n)).collect();
      println!("  {:<22} {}", session, line.join(" "));
    }

    if !collector.counters.is_empty() {
      println!("-- counters");
      let mut counters: Vec<_> = collector.counters.iter().collect();
      counters.sort();
      for ((session, name), value) in counters {
        println!("  {:<22} {:<16} {}", session, name, value);
      }
    }

    println!("-- timeline");
    for e in &events {
      println!(
        "  {:>5} +{:>10.6}s {:<22} {:<18} slot={:<4} thread={} task={} {}",
        e.seq,
        e.at.as_secs_f64(),
        e.session,
        e.kind,
        e.slot.map_or_else(|| "-".to_string(), |s| s.to_string()),
        e.thread_name.as_deref().unwrap_or("?"),
        e.task.map_or_else(|| "-".to_string(), |t| t.to_string()),
        e.detail.as_deref().unwrap_or(""),
      );
    }
  }
}

#[cfg(not(feature = "plexus_telemetry"))]
mod disabled {
  use super::EventKind;

  #[inline(always)]
  pub fn log_event(
    _slot: Option<usize>,
    _session: &'static str,
    _kind: EventKind,
    _detail: Option<std::fmt::Arguments<'_>>,
  ) {
  }

  #[inline(always)]
  pub fn increment_counter(_session: &'static str, _counter: &'static str) {}

  /// Does nothing without the `plexus_telemetry` feature.
  #[inline(always)]
  pub fn print_telemetry_report() {}

  /// Does nothing without the `plexus_telemetry` feature.
  #[inline(always)]
  pub fn clear_telemetry() {}
}

#[cfg(feature = "plexus_telemetry")]
pub use enabled::{
  clear_telemetry, counter, events, increment_counter, log_event, print_telemetry_report,
  SessionEvent,
};

#[cfg(not(feature = "plexus_telemetry"))]
pub(crate) use disabled::{increment_counter, log_event};
#[cfg(not(feature = "plexus_telemetry"))]
pub use disabled::{clear_telemetry, print_telemetry_report};
