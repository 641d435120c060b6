//! Type erasure over heterogeneous queues.
//!
//! [`ErasedQueue`] lets a single collection hold queues of different element
//! types. Items cross the erased boundary as [`Value`]s, which remember their
//! concrete type so that a send of the wrong type is rejected at the call site
//! with a [`ContractViolation`].

use crate::error::{ContractViolation, TrySendError};
use crate::probe::{Probe, RecvProbe, SendProbe};
use crate::queue::Queue;
use crate::select::{Signal, Watch};

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

trait AnyValue: Any + Send {
  fn clone_box(&self) -> Box<dyn AnyValue>;
  fn as_any(&self) -> &dyn Any;
  fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
  fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Clone> AnyValue for T {
  fn clone_box(&self) -> Box<dyn AnyValue> {
    Box::new(self.clone())
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
    self
  }

  fn type_name(&self) -> &'static str {
    any::type_name::<T>()
  }
}

/// Moves `a` into a `B` if both are the same type.
fn cast_same<A: Any, B: Any>(a: A) -> Result<B, A> {
  let mut slot = Some(a);
  if let Some(b) = (&mut slot as &mut dyn Any)
    .downcast_mut::<Option<B>>()
    .and_then(Option::take)
  {
    return Ok(b);
  }
  match slot {
    Some(a) => Err(a),
    None => unreachable!("slot is only emptied on a successful cast"),
  }
}

/// A type-erased, cloneable item.
///
/// Wrapping a `Value` in a `Value` is the identity, so queues of `Value`
/// compose with erased queues without nesting.
pub struct Value(Box<dyn AnyValue>);

impl Value {
  /// Erases `item`.
  pub fn new<T: Any + Send + Clone>(item: T) -> Self {
    match cast_same::<T, Value>(item) {
      Ok(value) => value,
      Err(item) => Value(Box::new(item)),
    }
  }

  /// Returns `true` if the erased item is a `T`.
  pub fn is<T: Any>(&self) -> bool {
    self.0.as_any().is::<T>()
  }

  /// Borrows the erased item as a `T`.
  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.0.as_any().downcast_ref::<T>()
  }

  /// Recovers the erased item as a `T`, or gives the value back.
  pub fn downcast<T: Any>(self) -> Result<T, Value> {
    let this = match cast_same::<Value, T>(self) {
      Ok(same) => return Ok(same),
      Err(this) => this,
    };
    if !this.is::<T>() {
      return Err(this);
    }
    match this.0.into_any().downcast::<T>() {
      Ok(item) => Ok(*item),
      Err(_) => unreachable!("type checked above"),
    }
  }

  /// Name of the erased item's concrete type.
  pub fn type_name(&self) -> &'static str {
    self.0.type_name()
  }
}

impl Clone for Value {
  fn clone(&self) -> Self {
    Value(self.0.clone_box())
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Value<{}>", self.type_name())
  }
}

/// Object-safe view of a `Queue<T>` with the element type erased.
trait ErasedOps: Send + Sync {
  fn recv_value(&self) -> RecvProbe<Value>;
  fn send_value(&self, value: Value) -> Result<SendProbe<Value>, ContractViolation>;
  fn close(&self) -> bool;
  fn is_closed(&self) -> bool;
  fn watch(&self, signal: &Arc<Signal>);
  fn unwatch(&self, signal: &Arc<Signal>);
  fn element_type_name(&self) -> &'static str;
  fn len(&self) -> usize;
  fn capacity(&self) -> Option<usize>;
  fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Clone> ErasedOps for Queue<T> {
  fn recv_value(&self) -> RecvProbe<Value> {
    self.probe_recv().map(Value::new)
  }

  fn send_value(&self, value: Value) -> Result<SendProbe<Value>, ContractViolation> {
    let item = value.downcast::<T>().map_err(|rejected| ContractViolation {
      expected: any::type_name::<T>(),
      found: rejected.type_name(),
    })?;
    Ok(match self.try_send(item) {
      Ok(()) => SendProbe::Ok,
      Err(TrySendError::Closed(item)) => SendProbe::Closed(Value::new(item)),
      Err(TrySendError::Full(item)) => SendProbe::Blocked(Value::new(item)),
    })
  }

  fn close(&self) -> bool {
    self.probe_close()
  }

  fn is_closed(&self) -> bool {
    Queue::is_closed(self)
  }

  fn watch(&self, signal: &Arc<Signal>) {
    self.add_observer(signal);
  }

  fn unwatch(&self, signal: &Arc<Signal>) {
    self.remove_observer(signal);
  }

  fn element_type_name(&self) -> &'static str {
    any::type_name::<T>()
  }

  fn len(&self) -> usize {
    Queue::len(self)
  }

  fn capacity(&self) -> Option<usize> {
    Queue::capacity(self)
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

/// A handle to a queue of any element type.
///
/// Cloning the handle does not clone the queue.
#[derive(Clone)]
pub struct ErasedQueue {
  inner: Arc<dyn ErasedOps>,
}

impl ErasedQueue {
  /// Erases the element type of `queue`.
  pub fn new<T: Any + Send + Clone>(queue: Queue<T>) -> Self {
    ErasedQueue {
      inner: Arc::new(queue),
    }
  }

  /// Non-blocking receive.
  pub fn try_recv(&self) -> RecvProbe<Value> {
    self.inner.recv_value()
  }

  /// Non-blocking send.
  ///
  /// # Errors
  ///
  /// Returns a [`ContractViolation`] if `value` is not of the queue's element
  /// type. The queue is left untouched in that case.
  pub fn try_send(&self, value: Value) -> Result<SendProbe<Value>, ContractViolation> {
    self.inner.send_value(value)
  }

  /// Closes the queue. Returns `true` if this call closed it.
  pub fn try_close(&self) -> bool {
    self.inner.close()
  }

  /// Lock-free snapshot of the closed state. Only `true` is durable.
  pub fn is_closed(&self) -> bool {
    self.inner.is_closed()
  }

  /// Name of the queue's element type.
  pub fn element_type_name(&self) -> &'static str {
    self.inner.element_type_name()
  }

  /// Number of items waiting to be received.
  pub fn len(&self) -> usize {
    self.inner.len()
  }

  /// Returns `true` if no item is waiting to be received.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// The queue's capacity, or `None` if it is unbounded.
  pub fn capacity(&self) -> Option<usize> {
    self.inner.capacity()
  }

  /// Recovers the typed handle, if the element type is `T`.
  pub fn typed<T: Any + Send + Clone>(&self) -> Option<Queue<T>> {
    self.inner.as_any().downcast_ref::<Queue<T>>().cloned()
  }
}

impl fmt::Debug for ErasedQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErasedQueue")
      .field("element", &self.element_type_name())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl<T: Any + Send + Clone> From<Queue<T>> for ErasedQueue {
  fn from(queue: Queue<T>) -> Self {
    ErasedQueue::new(queue)
  }
}

impl<T: Any + Send + Clone> Queue<T> {
  /// Returns an erased handle to the same queue.
  pub fn erase(&self) -> ErasedQueue {
    ErasedQueue::new(self.clone())
  }
}

impl Probe for ErasedQueue {
  type Item = Value;
  type Error = ContractViolation;

  fn probe_recv(&self) -> RecvProbe<Value> {
    self.try_recv()
  }

  fn probe_send(&self, item: Value) -> Result<SendProbe<Value>, ContractViolation> {
    self.try_send(item)
  }

  fn probe_close(&self) -> bool {
    self.try_close()
  }

  fn probe_is_closed(&self) -> bool {
    self.is_closed()
  }
}

impl Watch for ErasedQueue {
  fn watch(&self, signal: &Arc<Signal>) {
    self.inner.watch(signal);
  }

  fn unwatch(&self, signal: &Arc<Signal>) {
    self.inner.unwatch(signal);
  }
}
