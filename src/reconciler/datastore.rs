use std::{
  cell::{Cell, RefCell},
  collections::BTreeMap,
  rc::{Rc, Weak},
  sync::Arc,
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{collection::CollectionInterface, object::OutboundMessageQueue};
use crate::{
  result::AccessResult,
  structure::{ClockSource, SystemClock},
  transport::{
    BareChangeEventAccessor, ChangeEvent, ChangeEventView, ChangeType,
    CollectionChangeEventAccessor, CollectionMessageEventAccessor,
    CollectionUpdateEventAccessor, FullUpdateRequestEventAccessor, TransportStream,
  },
};

/// Per-process agent owning the two streams of a connection and the local
/// mirror state behind them.
///
/// The host drives it from a single-threaded tick loop, alternating
/// [`tick_inbound`] and [`tick_outbound`]. Neither entry point returns
/// failures: peer-induced problems are logged and recovered through the
/// full-update handshake, and only caller mistakes (unregistered
/// collections, oversized frames) surface synchronously from other calls.
///
/// [`tick_inbound`]: DataStoreReconciler::tick_inbound
/// [`tick_outbound`]: DataStoreReconciler::tick_outbound
pub struct DataStoreReconciler {
  inbound: Weak<RefCell<TransportStream>>,
  outbound: Weak<RefCell<TransportStream>>,
  collections: BTreeMap<i32, Rc<dyn CollectionInterface>>,
  messages: Rc<RefCell<OutboundMessageQueue>>,
  request_full_update: Cell<bool>,
  peer_shutdown: Cell<bool>,
}

impl DataStoreReconciler {
  /// Binds to the connection's two streams: this process reads `inbound`
  /// and claims the writer role on `outbound`. The reconciler holds only
  /// weak references; the host owns the streams.
  pub fn new(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
  ) -> Self {
    Self::with_clock(inbound, outbound, Arc::new(SystemClock))
  }

  pub fn with_clock(
    inbound: &Rc<RefCell<TransportStream>>,
    outbound: &Rc<RefCell<TransportStream>>,
    clock: Arc<dyn ClockSource>,
  ) -> Self {
    inbound.borrow_mut().register_reader();
    outbound.borrow_mut().register_writer();
    Self {
      inbound: Rc::downgrade(inbound),
      outbound: Rc::downgrade(outbound),
      collections: BTreeMap::new(),
      messages: Rc::new(RefCell::new(OutboundMessageQueue::new(clock))),
      request_full_update: Cell::new(false),
      peer_shutdown: Cell::new(false),
    }
  }

  /// Indexes a collection by its id. Must run before the first tick;
  /// registering two collections under one id keeps the later one.
  pub fn register_collection(&mut self, collection: Rc<dyn CollectionInterface>) {
    let id = collection.collection_id();
    if self.collections.insert(id, collection).is_some() {
      warn!("collection id {id} registered twice, keeping the later one");
    }
  }

  pub(crate) fn message_queue(&self) -> &Rc<RefCell<OutboundMessageQueue>> {
    &self.messages
  }

  /// Drains the inbound ring up to its current cursor, dispatching each
  /// frame to its collection. Never fails outward; an overrun or writer
  /// change starts full-update recovery.
  pub fn tick_inbound(&mut self) {
    let Some(stream) = self.inbound.upgrade() else {
      trace!("inbound stream is gone, skipping tick");
      return;
    };

    if self.peer_shutdown.get() {
      // the writer said goodbye; wait for a new writer generation
      if stream.borrow_mut().check_writer_changed() {
        info!("new writer generation after shutdown, resynchronizing");
        self.peer_shutdown.set(false);
        self.begin_full_update_recovery();
      }
      return;
    }

    let result = stream
      .borrow_mut()
      .poll_events(|event| self.dispatch_event(event));
    match result {
      Ok(()) => {}
      Err(e) if e.requires_full_update() => {
        warn!("inbound stream lost sync ({e}), requesting full update");
        self.begin_full_update_recovery();
      }
      Err(e) => error!("inbound tick failed: {e}"),
    }
  }

  /// Flushes pending outbound state: a queued full-update request, then
  /// every collection's creates/updates/deletes, then queued messages. All
  /// frames of one tick publish atomically with a single cursor store.
  pub fn tick_outbound(&mut self) {
    let Some(stream) = self.outbound.upgrade() else {
      trace!("outbound stream is gone, skipping tick");
      return;
    };

    // producers (signals) run first so the messages they queue flush below
    for collection in self.collections.values() {
      collection.tick_objects();
    }
    let queued_messages = self.messages.borrow_mut().drain();

    let collections = &self.collections;
    let request_full_update = self.request_full_update.replace(false);
    let full_update_mask = self.mirrored_collection_mask();
    stream.borrow_mut().transact(|accessor| {
      if request_full_update {
        if let Err(e) = FullUpdateRequestEventAccessor::request(accessor, full_update_mask) {
          error!("failed to emit full update request: {e}");
        }
      }

      for collection in collections.values() {
        collection.write_changes(accessor);
      }

      for message in queued_messages {
        let reserved = CollectionMessageEventAccessor::message(
          accessor,
          message.collection_id,
          &message.object_id,
          message.message_type,
          message.payload.len(),
          Some(message.timestamp),
        );
        match reserved {
          Ok(event) => {
            let copied = event
              .message_data()
              .and_then(|data| data.copy_in(0, &message.payload));
            if let Err(e) = copied {
              error!("failed to place message payload: {e}");
            }
          }
          Err(e) => error!(
            "failed to emit message {} for {}: {e}",
            message.message_type, message.object_id
          ),
        }
      }
    });
  }

  /// Emits a Shutdown frame and detaches from both streams.
  pub fn shutdown(&mut self) {
    if let Some(stream) = self.outbound.upgrade() {
      stream.borrow_mut().transact(|accessor| {
        if let Err(e) = BareChangeEventAccessor::shutdown(accessor) {
          error!("failed to emit shutdown frame: {e}");
        }
      });
    }
    self.inbound = Weak::new();
    self.outbound = Weak::new();
    info!("reconciler shut down");
  }

  /// Bitmask of registered mirrored collections, the set whose state is
  /// re-seeded by a full update.
  fn mirrored_collection_mask(&self) -> u64 {
    let mut mask = 0u64;
    for (id, collection) in &self.collections {
      if collection.is_local_owned() {
        continue;
      }
      if (0..64).contains(id) {
        mask |= 1u64 << *id;
      } else {
        warn!("collection id {id} does not fit the full-update mask");
      }
    }
    mask
  }

  fn begin_full_update_recovery(&self) {
    for collection in self.collections.values() {
      collection.process_full_reset();
    }
    self.request_full_update.set(true);
  }

  fn dispatch_event(&self, event: &ChangeEvent) {
    let Some(kind) = event.kind() else {
      warn!("skipping frame with unknown change type {}", event.kind_raw);
      return;
    };

    let result: AccessResult<()> = (|| {
      match kind {
        ChangeType::CreateObject | ChangeType::DeleteObject => {
          let view = CollectionChangeEventAccessor::wrap(event.payload.clone());
          let collection_id = view.collection_id()?;
          let id = view.object_id()?;
          let Some(collection) = self.collections.get(&collection_id) else {
            warn!("frame for unregistered collection {collection_id}, skipping");
            return Ok(());
          };
          if kind == ChangeType::CreateObject {
            collection.process_create(id, &view.change_data()?, event.timestamp);
          } else {
            collection.process_delete(id);
          }
        }
        ChangeType::UpdateObject => {
          let view = CollectionUpdateEventAccessor::wrap(event.payload.clone());
          let collection_id = view.collection_id()?;
          let id = view.object_id()?;
          let fields_changed = view.fields_changed()?;
          let Some(collection) = self.collections.get(&collection_id) else {
            warn!("frame for unregistered collection {collection_id}, skipping");
            return Ok(());
          };
          collection.process_update(id, &view.change_data()?, fields_changed);
        }
        ChangeType::Message => {
          let view = CollectionMessageEventAccessor::wrap(event.payload.clone());
          let collection_id = view.collection_id()?;
          let id = view.object_id()?;
          let message_type = view.message_type()?;
          let Some(collection) = self.collections.get(&collection_id) else {
            warn!("frame for unregistered collection {collection_id}, skipping");
            return Ok(());
          };
          collection.process_message(id, message_type, event.timestamp, &view.message_data()?);
        }
        ChangeType::RequestFullUpdate => {
          let view = FullUpdateRequestEventAccessor::wrap(event.payload.clone());
          let mask = view.collection_id_mask()?;
          debug!("peer requested full update for collection mask {mask:#x}");
          for (id, collection) in &self.collections {
            if collection.is_local_owned()
              && (0..64).contains(id)
              && mask & (1u64 << *id) != 0
            {
              collection.prep_full_update();
            }
          }
        }
        ChangeType::Shutdown => {
          info!("peer sent shutdown, dropping mirrored state");
          self.peer_shutdown.set(true);
          for collection in self.collections.values() {
            collection.process_full_reset();
          }
        }
      }
      Ok(())
    })();

    if let Err(e) = result {
      warn!("skipping malformed {kind:?} frame: {e}");
    }
  }
}
