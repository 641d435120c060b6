//! Composition primitives for message-passing queues.
//!
//! Plexus combines a run-time determined number of queues, possibly of
//! different element types, without blocking on any single one of them:
//!
//! - **Probes** ([`try_recv`], [`try_send`], [`try_close`], [`is_closed`])
//!   never block and report a tri-state [`Status`]: `Ok`, `Closed` or
//!   `Blocked`. `Closed` is permanent once observed.
//! - **Retry combinators** ([`recv_or_else`], [`send_or_else`]) re-probe until
//!   a terminal outcome, running a caller-chosen fallback in between.
//! - **Fan-in** ([`fan_in`]) merges K inputs into one output with one-shot
//!   cancellation. **Fan-out** ([`fan_out`]) broadcasts one input to N
//!   outputs with a per-item barrier.
//!
//! All of them work with typed [`Queue`]s and with type-erased
//! [`ErasedQueue`]s, whose items travel as [`Value`]s.
//!
//! Queues follow owner-close semantics: only an explicit `close` closes a
//! queue, and a closed queue keeps yielding what it buffered until drained.
//!
//! Enable the `plexus_telemetry` feature to record session events, see
//! [`telemetry`].

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod error;
pub mod queue;

pub mod erased;
pub mod fan_in;
pub mod fan_out;
pub mod probe;
pub mod retry;
pub mod select;
pub mod session;
pub mod telemetry;

pub use error::{
  CloseError, ContractViolation, RecvError, RecvTimeoutError, SendError, SessionPanicked,
  SpawnError, Status, TryRecvError, TrySendError,
};
pub use queue::{Backoff, Queue};

pub use erased::{ErasedQueue, Value};
pub use probe::{is_closed, try_close, try_recv, try_send, Probe, RecvProbe, SendProbe};
pub use retry::{recv_or_else, send_or_else};
pub use select::{Select, Selected, Signal, Source, Watch};

pub use fan_in::{fan_in, Canceller, FanIn, FanInBuilder};
pub use fan_out::{fan_out, FanOut, FanOutBuilder};
pub use session::Session;
