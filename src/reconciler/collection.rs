use std::{
  cell::RefCell,
  collections::{HashMap, HashSet},
  rc::{Rc, Weak},
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{
  datastore::DataStoreReconciler,
  index::CollectionIndexBinding,
  object::{CollectionHandle, DirtySink, MessageWriter, OutboundMessageQueue, ReconciledObject},
};
use crate::{
  memory::MemoryAccessor,
  structure::ObjectUuid,
  transport::{CollectionChangeEventAccessor, TransportStreamAccessor},
};

/// Factory for mirrored objects, supplied by the binding of an inbound
/// collection. Receives the new object's id, the Create frame's field data
/// and the back-reference handle to install.
pub type CreateDelegate<O> =
  Box<dyn Fn(ObjectUuid, &MemoryAccessor, CollectionHandle) -> Rc<RefCell<O>>>;

/// Type-erased collection surface the reconciler drives. Implemented by
/// [`ObjectCollection`]; kept object-safe so a reconciler can hold any mix
/// of object types.
pub trait CollectionInterface {
  fn collection_id(&self) -> i32;

  /// True for collections whose objects this process owns and serializes
  /// outbound; false for mirrored collections.
  fn is_local_owned(&self) -> bool;

  /// Flushes pending creates, updates and deletes into the outbound ring.
  fn write_changes(&self, accessor: &mut TransportStreamAccessor<'_>);

  /// Advances per-object producers (signals) before an outbound flush.
  fn tick_objects(&self);

  /// Re-arms every owned object to emit a full Create on the next flush.
  fn prep_full_update(&self);

  fn process_create(&self, id: ObjectUuid, payload: &MemoryAccessor, timestamp: u64);
  fn process_update(&self, id: ObjectUuid, payload: &MemoryAccessor, fields_changed: u64);
  fn process_delete(&self, id: ObjectUuid);
  fn process_message(
    &self,
    id: ObjectUuid,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  );

  /// Drops all mirrored state (writer shutdown, overrun recovery). Owned
  /// objects are kept; they re-announce through the full-update handshake.
  fn process_full_reset(&self);
}

#[derive(Default)]
struct PendingWrites {
  write_queue: Vec<ObjectUuid>,
  queued: HashSet<ObjectUuid>,
  tombstones: Vec<ObjectUuid>,
  deferred_index: Vec<ObjectUuid>,
}

/// Typed container of objects keyed by uuid, attached to a reconciler under
/// a schema-assigned collection id.
///
/// A collection runs in one of two modes. Locally-owned: the caller adds
/// and removes objects, their dirty state flushes outbound. Mirrored: the
/// create delegate materializes objects from inbound Create frames and the
/// peer's events drive their lifecycle. `inbound_field_mask` names the
/// fields this side accepts from the peer (everything for mirrored
/// collections, only reverse-reconciled fields for owned ones);
/// `indexed_field_mask` gates secondary-index maintenance on updates.
pub struct ObjectCollection<O: ReconciledObject> {
  collection_id: i32,
  inbound_field_mask: u64,
  indexed_field_mask: u64,
  local_owned: bool,
  objects: RefCell<HashMap<ObjectUuid, Rc<RefCell<O>>>>,
  pending: RefCell<PendingWrites>,
  messages: Weak<RefCell<OutboundMessageQueue>>,
  create_delegate: RefCell<Option<CreateDelegate<O>>>,
  indexes: RefCell<Vec<Rc<dyn CollectionIndexBinding<O>>>>,
  weak_self: Weak<ObjectCollection<O>>,
}

impl<O: ReconciledObject> ObjectCollection<O> {
  /// Builds the collection and registers it with the reconciler. Must run
  /// before the reconciler's first tick.
  pub fn register(
    reconciler: &mut DataStoreReconciler,
    collection_id: i32,
    inbound_field_mask: u64,
    indexed_field_mask: u64,
    local_owned: bool,
  ) -> Rc<Self> {
    let messages = Rc::downgrade(reconciler.message_queue());
    let collection = Rc::new_cyclic(|weak_self| Self {
      collection_id,
      inbound_field_mask,
      indexed_field_mask,
      local_owned,
      objects: RefCell::new(HashMap::new()),
      pending: RefCell::new(PendingWrites::default()),
      messages,
      create_delegate: RefCell::new(None),
      indexes: RefCell::new(Vec::new()),
      weak_self: weak_self.clone(),
    });
    reconciler.register_collection(collection.clone());
    collection
  }

  /// Installs the factory for mirrored objects.
  pub fn set_create_delegate(&self, delegate: CreateDelegate<O>) {
    *self.create_delegate.borrow_mut() = Some(delegate);
  }

  /// Back-reference handle objects use to report dirty fields and queue
  /// messages.
  pub fn handle(&self) -> CollectionHandle {
    let sink: Weak<dyn DirtySink> = self.weak_self.clone();
    CollectionHandle::new(self.collection_id, sink, self.messages.clone())
  }

  /// Adds a locally-created object; its first flush emits a Create frame
  /// carrying every field.
  pub fn add_object(&self, obj: &Rc<RefCell<O>>) {
    let id = obj.borrow().object_id();
    obj.borrow_mut().bind_collection(self.handle());
    self.objects.borrow_mut().insert(id, obj.clone());
    self.enqueue_write(id);
    self.notify_index_create(id, obj);
  }

  /// Removes an owned object; a Delete frame goes out on the next flush.
  pub fn remove_object(&self, id: ObjectUuid) {
    let Some(obj) = self.objects.borrow_mut().remove(&id) else {
      debug!(
        "collection {}: remove of unknown object {id}",
        self.collection_id
      );
      return;
    };
    self.notify_index_delete(id, &obj);
    obj.borrow_mut().bind_collection(CollectionHandle::unbound());
    let mut pending = self.pending.borrow_mut();
    pending.queued.remove(&id);
    pending.write_queue.retain(|queued| *queued != id);
    pending.tombstones.push(id);
  }

  pub fn get_object(&self, id: ObjectUuid) -> Option<Rc<RefCell<O>>> {
    self.objects.borrow().get(&id).cloned()
  }

  pub fn object_count(&self) -> usize {
    self.objects.borrow().len()
  }

  pub fn object_ids(&self) -> Vec<ObjectUuid> {
    self.objects.borrow().keys().copied().collect()
  }

  /// Registers a secondary index; existing objects are replayed into it.
  pub fn add_index(&self, index: Rc<dyn CollectionIndexBinding<O>>) {
    let existing: Vec<(ObjectUuid, Rc<RefCell<O>>)> = self
      .objects
      .borrow()
      .iter()
      .map(|(id, obj)| (*id, obj.clone()))
      .collect();
    for (id, obj) in &existing {
      index.on_create(*id, obj);
    }
    self.indexes.borrow_mut().push(index);
  }

  /// Reserves an outbound Message frame addressed from `id`.
  pub fn send_message(
    &self,
    id: ObjectUuid,
    message_type: i32,
    byte_count: usize,
  ) -> Option<MessageWriter> {
    self.handle().send_message(id, message_type, byte_count)
  }

  fn enqueue_write(&self, id: ObjectUuid) {
    let mut pending = self.pending.borrow_mut();
    if pending.queued.insert(id) {
      pending.write_queue.push(id);
    }
  }

  fn notify_index_create(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>) {
    for index in self.indexes.borrow().iter() {
      index.on_create(id, obj);
    }
  }

  fn notify_index_update(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>) {
    // the object may be mid-callback (its RefCell mutably borrowed); defer
    // the refresh to the next flush rather than re-borrowing
    if obj.try_borrow().is_ok() {
      for index in self.indexes.borrow().iter() {
        index.on_update(id, obj);
      }
    } else {
      self.pending.borrow_mut().deferred_index.push(id);
    }
  }

  fn notify_index_delete(&self, id: ObjectUuid, obj: &Rc<RefCell<O>>) {
    for index in self.indexes.borrow().iter() {
      index.on_delete(id, obj);
    }
  }

  fn flush_deferred_index(&self) {
    let deferred = std::mem::take(&mut self.pending.borrow_mut().deferred_index);
    for id in deferred {
      let obj = self.objects.borrow().get(&id).cloned();
      if let Some(obj) = obj {
        self.notify_index_update(id, &obj);
      }
    }
  }
}

impl<O: ReconciledObject> DirtySink for ObjectCollection<O> {
  fn notify_object_needs_write(&self, id: ObjectUuid) {
    self.enqueue_write(id);
  }

  fn set_dirty(&self, id: ObjectUuid, fields: u64) {
    self.enqueue_write(id);
    if fields & self.indexed_field_mask != 0 {
      let obj = self.objects.borrow().get(&id).cloned();
      if let Some(obj) = obj {
        self.notify_index_update(id, &obj);
      }
    }
  }
}

impl<O: ReconciledObject> CollectionInterface for ObjectCollection<O> {
  fn collection_id(&self) -> i32 {
    self.collection_id
  }

  fn is_local_owned(&self) -> bool {
    self.local_owned
  }

  fn write_changes(&self, accessor: &mut TransportStreamAccessor<'_>) {
    self.flush_deferred_index();
    let (write_queue, tombstones) = {
      let mut pending = self.pending.borrow_mut();
      pending.queued.clear();
      (
        std::mem::take(&mut pending.write_queue),
        std::mem::take(&mut pending.tombstones),
      )
    };

    for id in tombstones {
      if let Err(e) = CollectionChangeEventAccessor::delete(accessor, self.collection_id, &id) {
        error!(
          "collection {}: failed to emit delete for {id}: {e}",
          self.collection_id
        );
      }
    }

    for id in write_queue {
      let obj = self.objects.borrow().get(&id).cloned();
      let Some(obj) = obj else {
        // removed after being queued; the tombstone above covered it
        continue;
      };
      if let Err(e) = obj.borrow_mut().write_changes(accessor) {
        error!(
          "collection {}: failed to flush object {id}: {e}",
          self.collection_id
        );
      };
    }
  }

  fn tick_objects(&self) {
    let objects: Vec<Rc<RefCell<O>>> = self.objects.borrow().values().cloned().collect();
    for obj in objects {
      obj.borrow_mut().tick();
    }
  }

  fn prep_full_update(&self) {
    if !self.local_owned {
      return;
    }
    let objects: Vec<(ObjectUuid, Rc<RefCell<O>>)> = self
      .objects
      .borrow()
      .iter()
      .map(|(id, obj)| (*id, obj.clone()))
      .collect();
    debug!(
      "collection {}: full update requested for {} objects",
      self.collection_id,
      objects.len()
    );
    for (id, obj) in objects {
      obj.borrow_mut().prep_full_update();
      self.enqueue_write(id);
    }
  }

  fn process_create(&self, id: ObjectUuid, payload: &MemoryAccessor, _timestamp: u64) {
    let existing = self.objects.borrow().get(&id).cloned();
    if let Some(obj) = existing {
      // re-seed after recovery: a repeated Create overwrites the mirror
      if let Err(e) = obj.borrow_mut().process_update(payload, self.inbound_field_mask) {
        warn!(
          "collection {}: skipping unreadable re-create of {id}: {e}",
          self.collection_id
        );
        return;
      }
      self.notify_index_update(id, &obj);
      self.flush_deferred_index();
      return;
    }

    if self.local_owned {
      warn!(
        "collection {}: peer sent create for locally-owned collection, ignoring",
        self.collection_id
      );
      return;
    }

    let delegate = self.create_delegate.borrow();
    let Some(make) = delegate.as_ref() else {
      warn!(
        "collection {}: no create delegate registered, dropping create of {id}",
        self.collection_id
      );
      return;
    };
    let obj = make(id, payload, self.handle());
    drop(delegate);

    self.objects.borrow_mut().insert(id, obj.clone());
    if let Err(e) = obj.borrow_mut().process_update(payload, self.inbound_field_mask) {
      warn!(
        "collection {}: dropping unreadable create of {id}: {e}",
        self.collection_id
      );
      self.objects.borrow_mut().remove(&id);
      return;
    }
    self.notify_index_create(id, &obj);
    self.flush_deferred_index();
  }

  fn process_update(&self, id: ObjectUuid, payload: &MemoryAccessor, fields_changed: u64) {
    let obj = self.objects.borrow().get(&id).cloned();
    let Some(obj) = obj else {
      // benign race: the writer already deleted this object
      debug!(
        "collection {}: update for unknown object {id}, skipping",
        self.collection_id
      );
      return;
    };
    if let Err(e) = obj.borrow_mut().process_update(payload, fields_changed) {
      warn!(
        "collection {}: skipping unreadable update of {id}: {e}",
        self.collection_id
      );
      return;
    }
    if fields_changed & self.indexed_field_mask != 0 {
      self.notify_index_update(id, &obj);
    }
    self.flush_deferred_index();
  }

  fn process_delete(&self, id: ObjectUuid) {
    let removed = self.objects.borrow_mut().remove(&id);
    let Some(obj) = removed else {
      debug!(
        "collection {}: delete for unknown object {id}, skipping",
        self.collection_id
      );
      return;
    };
    self.notify_index_delete(id, &obj);
    obj.borrow_mut().process_delete();
  }

  fn process_message(
    &self,
    id: ObjectUuid,
    message_type: i32,
    timestamp: u64,
    payload: &MemoryAccessor,
  ) {
    let obj = self.objects.borrow().get(&id).cloned();
    let Some(obj) = obj else {
      debug!(
        "collection {}: message {message_type} for unknown object {id}, skipping",
        self.collection_id
      );
      return;
    };
    if let Err(e) = obj.borrow_mut().process_message(message_type, timestamp, payload) {
      warn!(
        "collection {}: skipping unreadable message {message_type} for {id}: {e}",
        self.collection_id
      );
    };
  }

  fn process_full_reset(&self) {
    if self.local_owned {
      return;
    }
    let all: Vec<(ObjectUuid, Rc<RefCell<O>>)> =
      self.objects.borrow_mut().drain().collect();
    if !all.is_empty() {
      info!(
        "collection {}: dropping {} mirrored objects for recovery",
        self.collection_id,
        all.len()
      );
    }
    for (id, obj) in all {
      self.notify_index_delete(id, &obj);
      obj.borrow_mut().process_delete();
    }
  }
}
