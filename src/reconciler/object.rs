use std::{
  cell::RefCell,
  rc::{Rc, Weak},
  sync::Arc,
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  memory::MemoryAccessor,
  result::{AccessResult, TransportResult},
  structure::{current_clock_time_microseconds, ClockSource, ObjectUuid},
  transport::TransportStreamAccessor,
};

/// Behavior a collection needs from its objects. Bindings implement this
/// once per object type; the reconciler core stays type-erased behind it.
///
/// Locally-owned objects implement the write side (`write_changes`,
/// `prep_full_update`) and may also accept reverse-reconciled fields in
/// `process_update`. Mirrored objects implement the read side and leave the
/// write side as a no-op unless they own reverse fields.
pub trait ReconciledObject: 'static {
  fn object_id(&self) -> ObjectUuid;

  /// Injects the weak back-reference to the owning collection. Called once
  /// when the object enters a collection; the handle must not be held as a
  /// strong reference to anything the collection owns.
  fn bind_collection(&mut self, handle: CollectionHandle);

  /// Flushes pending local changes as Create/Update frames. The first
  /// flush of a locally-created object emits Create with all fields; later
  /// flushes emit Update with the accumulated dirty mask.
  fn write_changes(&mut self, accessor: &mut TransportStreamAccessor<'_>) -> TransportResult<()>;

  /// Re-arms the object so its next flush emits a full Create again, used
  /// when a reader requested a full update.
  fn prep_full_update(&mut self);

  /// Applies inbound field data. `fields_changed` names the fields present
  /// in `payload`, in declared order.
  fn process_update(&mut self, payload: &MemoryAccessor, fields_changed: u64) -> AccessResult<()>;

  /// Dispatches an inbound message to the registered handler, if any.
  fn process_message(
    &mut self,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  ) -> AccessResult<()>;

  /// The object is leaving its collection (peer delete, shutdown, or
  /// recovery teardown).
  fn process_delete(&mut self) {}

  /// Per-outbound-tick hook; signal producers advance here.
  fn tick(&mut self) {}
}

/// Sink for dirty notifications, implemented by the owning collection.
pub(crate) trait DirtySink {
  fn notify_object_needs_write(&self, id: ObjectUuid);
  fn set_dirty(&self, id: ObjectUuid, fields: u64);
}

/// Weak back-reference from an object to its collection.
///
/// Objects call through here when their setters mark fields dirty or queue
/// messages. The handle deliberately holds no strong references, so object
/// graphs cannot keep their collection (or the reconciler behind it) alive.
#[derive(Clone, Default)]
pub struct CollectionHandle {
  collection_id: i32,
  sink: Option<Weak<dyn DirtySink>>,
  messages: Option<Weak<RefCell<OutboundMessageQueue>>>,
}

impl CollectionHandle {
  /// Handle of an object not yet added to a collection; every operation is
  /// a no-op until [`ReconciledObject::bind_collection`] replaces it.
  pub fn unbound() -> Self {
    Self::default()
  }

  pub(crate) fn new(
    collection_id: i32,
    sink: Weak<dyn DirtySink>,
    messages: Weak<RefCell<OutboundMessageQueue>>,
  ) -> Self {
    Self {
      collection_id,
      sink: Some(sink),
      messages: Some(messages),
    }
  }

  pub fn collection_id(&self) -> i32 {
    self.collection_id
  }

  pub fn is_bound(&self) -> bool {
    self
      .sink
      .as_ref()
      .map_or(false, |sink| sink.upgrade().is_some())
  }

  /// First dirty mark of a tick; idempotent within the tick.
  pub fn notify_object_needs_write(&self, id: ObjectUuid) {
    if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
      sink.notify_object_needs_write(id);
    }
  }

  /// Unions `fields` into the object's pending mask.
  pub fn set_dirty(&self, id: ObjectUuid, fields: u64) {
    if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
      sink.set_dirty(id, fields);
    }
  }

  /// Reserves an outbound Message frame of `byte_count` payload bytes. The
  /// caller writes the payload through the returned writer; the message is
  /// queued when the writer drops and flushed on the next outbound tick.
  pub fn send_message(
    &self,
    id: ObjectUuid,
    message_type: i32,
    byte_count: usize,
  ) -> Option<MessageWriter> {
    let queue = self.messages.as_ref().and_then(Weak::upgrade)?;
    let timestamp = queue.borrow().now();
    Some(MessageWriter::new(
      Rc::downgrade(&queue),
      self.collection_id,
      id,
      message_type,
      byte_count,
      timestamp,
    ))
  }

  /// Reconciler clock, for producers that pace on elapsed time.
  pub fn now_microseconds(&self) -> u64 {
    match self.messages.as_ref().and_then(Weak::upgrade) {
      Some(queue) => queue.borrow().now(),
      None => current_clock_time_microseconds(),
    }
  }
}

/// Outbound messages staged between a send call and the next outbound tick.
pub(crate) struct OutboundMessageQueue {
  clock: Arc<dyn ClockSource>,
  entries: Vec<QueuedMessage>,
}

pub(crate) struct QueuedMessage {
  pub collection_id: i32,
  pub object_id: ObjectUuid,
  pub message_type: i32,
  pub timestamp: u64,
  pub payload: Vec<u8>,
}

impl OutboundMessageQueue {
  pub fn new(clock: Arc<dyn ClockSource>) -> Self {
    Self {
      clock,
      entries: Vec::new(),
    }
  }

  pub fn now(&self) -> u64 {
    self.clock.now_microseconds()
  }

  fn push(&mut self, message: QueuedMessage) {
    self.entries.push(message);
  }

  pub fn drain(&mut self) -> Vec<QueuedMessage> {
    std::mem::take(&mut self.entries)
  }
}

/// In-place writer over a reserved Message payload. Dropping the writer
/// commits the message to the outbound queue.
pub struct MessageWriter {
  queue: Weak<RefCell<OutboundMessageQueue>>,
  collection_id: i32,
  object_id: ObjectUuid,
  message_type: i32,
  timestamp: u64,
  buf: Vec<u8>,
}

impl MessageWriter {
  pub(crate) fn new(
    queue: Weak<RefCell<OutboundMessageQueue>>,
    collection_id: i32,
    object_id: ObjectUuid,
    message_type: i32,
    byte_count: usize,
    timestamp: u64,
  ) -> Self {
    Self {
      queue,
      collection_id,
      object_id,
      message_type,
      timestamp,
      buf: vec![0u8; byte_count],
    }
  }

  pub fn byte_count(&self) -> usize {
    self.buf.len()
  }

  pub fn timestamp(&self) -> u64 {
    self.timestamp
  }

  /// Window over the message payload, valid while the writer is alive.
  pub fn accessor(&mut self) -> MemoryAccessor {
    unsafe { MemoryAccessor::from_raw(self.buf.as_mut_ptr(), self.buf.len()) }
  }
}

impl Drop for MessageWriter {
  fn drop(&mut self) {
    match self.queue.upgrade() {
      Some(queue) => queue.borrow_mut().push(QueuedMessage {
        collection_id: self.collection_id,
        object_id: self.object_id,
        message_type: self.message_type,
        timestamp: self.timestamp,
        payload: std::mem::take(&mut self.buf),
      }),
      None => trace!("message dropped: reconciler is gone"),
    }
  }
}
