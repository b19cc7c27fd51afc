use std::sync::{
  atomic::{AtomicU32, AtomicU64, Ordering},
  Arc,
};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use num_traits::ToPrimitive;

use super::{
  layout, region_byte_count, BackingStore, ChangeEvent, ChangeEventView, ChangeType,
  HeapBackingStore, HeapRegion, TransportConfig, CHANGE_EVENT_HEADER_BYTE_COUNT,
  TRANSPORT_HEADER_BYTE_COUNT, TRANSPORT_MAGIC, TRANSPORT_VERSION,
};
#[cfg(unix)]
use super::SharedMemoryBackingStore;
use crate::{
  memory::{align8, MemoryAccessor, MemoryOffset},
  result::{TransportError, TransportResult},
  structure::{ClockSource, SchemaHash, SystemClock},
};

/// One direction of a connection: a schema-gated header plus a ring of
/// framed change events in a shared region.
///
/// Exactly one participant holds the writer role of a stream at any
/// instant; any number may read. The writer publishes frames by advancing
/// the header's write cursor with release ordering, which is the only
/// synchronization between participants.
pub struct TransportStream {
  name: String,
  store: Box<dyn BackingStore>,
  heap_handle: Option<HeapRegion>,
  clock: Arc<dyn ClockSource>,
  config: TransportConfig,
  ring_capacity: u64,
  read_cursor: u64,
  writer_generation_seen: u32,
  scratch: Vec<u8>,
  attached: bool,
}

impl std::fmt::Debug for TransportStream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransportStream")
      .field("name", &self.name)
      .field("ring_capacity", &self.ring_capacity)
      .field("read_cursor", &self.read_cursor)
      .field("writer_generation_seen", &self.writer_generation_seen)
      .field("attached", &self.attached)
      .finish()
  }
}

impl TransportStream {
  /// Attaches to (or creates) the named shared-memory region.
  #[cfg(unix)]
  pub fn open_shared_memory(name: &str, config: &TransportConfig) -> TransportResult<Self> {
    Self::open_shared_memory_with_clock(name, config, Arc::new(SystemClock))
  }

  #[cfg(unix)]
  pub fn open_shared_memory_with_clock(
    name: &str,
    config: &TransportConfig,
    clock: Arc<dyn ClockSource>,
  ) -> TransportResult<Self> {
    let store = SharedMemoryBackingStore::open(name, region_byte_count(config))?;
    Self::attach(name, Box::new(store), None, config, clock)
  }

  /// Allocates a heap region and attaches to it. Peers in the same process
  /// attach through [`TransportStream::heap_region`].
  pub fn open_heap(name: &str, config: &TransportConfig) -> TransportResult<Self> {
    Self::open_heap_with_clock(name, config, Arc::new(SystemClock))
  }

  pub fn open_heap_with_clock(
    name: &str,
    config: &TransportConfig,
    clock: Arc<dyn ClockSource>,
  ) -> TransportResult<Self> {
    let store = HeapBackingStore::create(region_byte_count(config));
    let region = store.region();
    Self::attach(name, Box::new(store), Some(region), config, clock)
  }

  /// Attaches to an existing heap region.
  pub fn attach_heap(
    name: &str,
    config: &TransportConfig,
    region: HeapRegion,
  ) -> TransportResult<Self> {
    let store = HeapBackingStore::attach(region);
    let handle = store.region();
    Self::attach(name, Box::new(store), Some(handle), config, Arc::new(SystemClock))
  }

  fn attach(
    name: &str,
    store: Box<dyn BackingStore>,
    heap_handle: Option<HeapRegion>,
    config: &TransportConfig,
    clock: Arc<dyn ClockSource>,
  ) -> TransportResult<Self> {
    let needed = region_byte_count(config);
    if store.len() < needed {
      return Err(TransportError::RegionTooSmall {
        name: name.to_string(),
        actual: store.len(),
        needed,
      });
    }

    let stream = Self {
      name: name.to_string(),
      heap_handle,
      clock,
      config: config.clone(),
      ring_capacity: config.ring_capacity(),
      read_cursor: 0,
      writer_generation_seen: 0,
      scratch: Vec::with_capacity(256),
      attached: false,
      store,
    };

    if stream.store.freshly_created() {
      stream.initialize_header()?;
      info!(
        "created transport stream {:?}: ring capacity {}",
        name, stream.ring_capacity
      );
    } else {
      stream.validate_header()?;
      debug!("attached to existing transport stream {:?}", name);
    }

    // best-effort attachment count, used for last-detach teardown
    stream.reader_count_atomic().fetch_add(1, Ordering::AcqRel);

    let mut stream = stream;
    stream.attached = true;
    stream.read_cursor = stream.write_cursor_atomic().load(Ordering::Acquire);
    stream.writer_generation_seen = stream.writer_liveness_atomic().load(Ordering::Acquire);
    Ok(stream)
  }

  fn header_accessor(&self) -> MemoryAccessor {
    unsafe { MemoryAccessor::from_raw(self.store.ptr(), TRANSPORT_HEADER_BYTE_COUNT) }
  }

  fn initialize_header(&self) -> TransportResult<()> {
    let header = self.header_accessor();
    header.copy_in(layout::MAGIC, &TRANSPORT_MAGIC)?;
    header.write_value(&TRANSPORT_VERSION, &mut MemoryOffset(layout::VERSION))?;
    header.zero_fill(layout::VERSION + 4, 4)?;
    header.write_value(&self.config.schema_hash, &mut MemoryOffset(layout::SCHEMA_HASH))?;
    header.write_value(&self.ring_capacity, &mut MemoryOffset(layout::RING_CAPACITY))?;
    header.write_value(&0u64, &mut MemoryOffset(layout::WRITE_CURSOR))?;
    header.write_value(&0u64, &mut MemoryOffset(layout::LAST_ENTRY_OFFSET))?;
    header.write_value(
      &self.clock.now_microseconds(),
      &mut MemoryOffset(layout::CREATION_TIMESTAMP),
    )?;
    header.write_value(&0u32, &mut MemoryOffset(layout::WRITER_LIVENESS))?;
    header.write_value(&0u32, &mut MemoryOffset(layout::READER_COUNT))?;
    header.zero_fill(layout::READER_COUNT + 4, 8)?;
    Ok(())
  }

  fn validate_header(&self) -> TransportResult<()> {
    let header = self.header_accessor();
    let mut magic = [0u8; 8];
    header.copy_out(layout::MAGIC, &mut magic)?;
    if magic != TRANSPORT_MAGIC {
      return Err(TransportError::CorruptHeader("bad magic"));
    }

    let version: u32 = header.read_value(&mut MemoryOffset(layout::VERSION))?;
    if version != TRANSPORT_VERSION {
      return Err(TransportError::VersionMismatch {
        supported: TRANSPORT_VERSION,
        found: version,
      });
    }

    let found: SchemaHash = header.read_value(&mut MemoryOffset(layout::SCHEMA_HASH))?;
    if found != self.config.schema_hash {
      error!(
        "schema mismatch attaching to {:?}: local {}, region {}",
        self.name, self.config.schema_hash, found
      );
      return Err(TransportError::SchemaMismatch {
        local: self.config.schema_hash,
        found,
      });
    }

    let capacity: u64 = header.read_value(&mut MemoryOffset(layout::RING_CAPACITY))?;
    if capacity != self.ring_capacity {
      return Err(TransportError::CorruptHeader(
        "ring capacity differs from caller config",
      ));
    }
    Ok(())
  }

  fn write_cursor_atomic(&self) -> &AtomicU64 {
    unsafe { &*(self.store.ptr().add(layout::WRITE_CURSOR) as *const AtomicU64) }
  }

  fn last_entry_atomic(&self) -> &AtomicU64 {
    unsafe { &*(self.store.ptr().add(layout::LAST_ENTRY_OFFSET) as *const AtomicU64) }
  }

  fn writer_liveness_atomic(&self) -> &AtomicU32 {
    unsafe { &*(self.store.ptr().add(layout::WRITER_LIVENESS) as *const AtomicU32) }
  }

  fn reader_count_atomic(&self) -> &AtomicU32 {
    unsafe { &*(self.store.ptr().add(layout::READER_COUNT) as *const AtomicU32) }
  }

  fn ring_ptr(&self) -> *mut u8 {
    unsafe { self.store.ptr().add(layout::RING) }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &TransportConfig {
    &self.config
  }

  pub fn ring_capacity(&self) -> u64 {
    self.ring_capacity
  }

  /// Current published write cursor.
  pub fn write_cursor(&self) -> u64 {
    self.write_cursor_atomic().load(Ordering::Acquire)
  }

  /// This reader's last-consumed cursor.
  pub fn read_cursor(&self) -> u64 {
    self.read_cursor
  }

  pub fn reader_count(&self) -> u32 {
    self.reader_count_atomic().load(Ordering::Relaxed)
  }

  pub fn writer_generation(&self) -> u32 {
    self.writer_liveness_atomic().load(Ordering::Acquire)
  }

  pub fn creation_timestamp(&self) -> u64 {
    self
      .header_accessor()
      .read_value(&mut MemoryOffset(layout::CREATION_TIMESTAMP))
      .unwrap_or(0)
  }

  /// Handle for attaching an in-process peer, when heap-backed.
  pub fn heap_region(&self) -> Option<HeapRegion> {
    self.heap_handle.clone()
  }

  /// Claims the writer role by bumping the liveness generation. Readers
  /// attached before this observe the change and resynchronize.
  pub fn register_writer(&mut self) {
    let generation = self.writer_liveness_atomic().fetch_add(1, Ordering::AcqRel) + 1;
    self.writer_generation_seen = generation;
    debug!("stream {:?}: writer generation {}", self.name, generation);
  }

  /// Registers this participant as a reader: snapshots the current writer
  /// generation so later generation changes are detected.
  pub fn register_reader(&mut self) {
    self.writer_generation_seen = self.writer_liveness_atomic().load(Ordering::Acquire);
  }

  /// True when the writer generation moved since this reader last
  /// synchronized; the seen generation is refreshed.
  pub fn check_writer_changed(&mut self) -> bool {
    let generation = self.writer_liveness_atomic().load(Ordering::Acquire);
    if generation != self.writer_generation_seen {
      self.writer_generation_seen = generation;
      true
    } else {
      false
    }
  }

  /// Runs a write transaction. Frames reserved inside the closure become
  /// visible to readers with a single release store of the write cursor
  /// when the closure returns.
  pub fn transact<R>(&mut self, f: impl FnOnce(&mut TransportStreamAccessor<'_>) -> R) -> R {
    // sole writer, so a relaxed read of our own cursor is exact
    let staged = self.write_cursor_atomic().load(Ordering::Relaxed);
    let mut accessor = TransportStreamAccessor {
      stream: self,
      staged_cursor: staged,
      last_entry: 0,
      wrote: false,
    };
    let result = f(&mut accessor);
    let (staged_cursor, last_entry, wrote) =
      (accessor.staged_cursor, accessor.last_entry, accessor.wrote);
    if wrote {
      self.last_entry_atomic().store(last_entry, Ordering::Relaxed);
      // linearization point: frames written above become visible here
      self
        .write_cursor_atomic()
        .store(staged_cursor, Ordering::Release);
    }
    result
  }

  /// Drains published frames from the last-consumed cursor to the cursor
  /// observed at entry, handing each to `sink` in ring order.
  ///
  /// Frames are staged through an internal scratch buffer and revalidated
  /// against the cursor after the copy, so a frame the writer reclaimed
  /// mid-copy is never dispatched. Errors snap the local cursor forward;
  /// the caller is expected to run full-update recovery on
  /// [`TransportError::requires_full_update`] failures.
  pub fn poll_events(&mut self, mut sink: impl FnMut(&ChangeEvent)) -> TransportResult<()> {
    let generation = self.writer_liveness_atomic().load(Ordering::Acquire);
    if generation != self.writer_generation_seen {
      let expected = self.writer_generation_seen;
      self.writer_generation_seen = generation;
      self.read_cursor = self.write_cursor_atomic().load(Ordering::Acquire);
      return Err(TransportError::WriterDisappeared {
        expected,
        found: generation,
      });
    }

    let head = self.write_cursor_atomic().load(Ordering::Acquire);
    if head == self.read_cursor {
      return Ok(());
    }

    let capacity = self.ring_capacity;
    if head.wrapping_sub(self.read_cursor) > capacity {
      let lag = head.wrapping_sub(self.read_cursor);
      self.read_cursor = head;
      return Err(TransportError::Overrun { lag, capacity });
    }

    while self.read_cursor < head {
      let frame_start = (self.read_cursor % capacity) as usize;
      let header = unsafe {
        MemoryAccessor::from_ring(
          self.ring_ptr(),
          capacity as usize,
          frame_start,
          CHANGE_EVENT_HEADER_BYTE_COUNT,
        )
      };
      let mut cursor = MemoryOffset::new();
      let byte_count: u32 = header.read_value(&mut cursor)?;
      let kind_raw: u32 = header.read_value(&mut cursor)?;
      let timestamp: u64 = header.read_value(&mut cursor)?;

      let frame_len = byte_count as usize;
      if frame_len < CHANGE_EVENT_HEADER_BYTE_COUNT
        || frame_len % 8 != 0
        || byte_count as u64 > capacity
        || self.read_cursor + byte_count as u64 > head
      {
        let cursor_at = self.read_cursor;
        self.read_cursor = head;
        return Err(TransportError::CorruptFrame {
          cursor: cursor_at,
          byte_count,
        });
      }

      self.scratch.resize(frame_len, 0);
      let frame = unsafe {
        MemoryAccessor::from_ring(self.ring_ptr(), capacity as usize, frame_start, frame_len)
      };
      frame.copy_out(0, &mut self.scratch)?;

      // revalidate after the copy: if the writer has lapped this frame in
      // the meantime the copied bytes may be torn
      let head_now = self.write_cursor_atomic().load(Ordering::Acquire);
      if head_now.wrapping_sub(self.read_cursor) > capacity {
        let lag = head_now.wrapping_sub(self.read_cursor);
        self.read_cursor = head_now;
        return Err(TransportError::Overrun { lag, capacity });
      }

      let staged = unsafe { MemoryAccessor::from_raw(self.scratch.as_mut_ptr(), frame_len) };
      let event = ChangeEvent {
        kind_raw,
        byte_count,
        timestamp,
        payload: staged.slice_from(CHANGE_EVENT_HEADER_BYTE_COUNT)?,
      };
      sink(&event);

      self.read_cursor += byte_count as u64;
    }
    Ok(())
  }
}

impl Drop for TransportStream {
  fn drop(&mut self) {
    if !self.attached {
      // refused at the schema gate: we never counted ourselves in
      return;
    }
    let previous = self.reader_count_atomic().fetch_sub(1, Ordering::AcqRel);
    self.store.on_detach(previous == 1);
  }
}

/// Write-side view of a stream inside a [`TransportStream::transact`]
/// closure. Reserves frames; the closure writes payloads in place through
/// the returned typed views.
pub struct TransportStreamAccessor<'a> {
  stream: &'a mut TransportStream,
  staged_cursor: u64,
  last_entry: u64,
  wrote: bool,
}

impl TransportStreamAccessor<'_> {
  pub fn now_microseconds(&self) -> u64 {
    self.stream.clock.now_microseconds()
  }

  /// Reserves a frame for an event of `kind` carrying `change_byte_count`
  /// bytes of variable data after `E`'s fixed fields, writes the frame
  /// header, and returns the typed payload view.
  ///
  /// The reservation is exact: the stream never moves or re-sizes a frame
  /// after placement, so callers must pre-compute variable sizes with the
  /// codec size-of helpers.
  pub fn write_change_event<E: ChangeEventView>(
    &mut self,
    kind: ChangeType,
    change_byte_count: usize,
    timestamp: Option<u64>,
  ) -> TransportResult<E> {
    debug_assert_eq!(E::FIXED_BYTE_COUNT, kind.fixed_payload_byte_count());
    let total = align8(CHANGE_EVENT_HEADER_BYTE_COUNT + E::FIXED_BYTE_COUNT + change_byte_count);
    let capacity = self.stream.ring_capacity;
    if total as u64 > capacity {
      return Err(TransportError::FrameTooLarge {
        byte_count: total,
        capacity,
      });
    }

    let frame_start = (self.staged_cursor % capacity) as usize;
    let frame = unsafe {
      MemoryAccessor::from_ring(self.stream.ring_ptr(), capacity as usize, frame_start, total)
    };
    let mut cursor = MemoryOffset::new();
    frame.write_value(&(total as u32), &mut cursor)?;
    frame.write_value(&kind.to_u32().unwrap_or(0), &mut cursor)?;
    let timestamp = timestamp.unwrap_or_else(|| self.stream.clock.now_microseconds());
    frame.write_value(&timestamp, &mut cursor)?;

    self.last_entry = self.staged_cursor;
    self.staged_cursor += total as u64;
    self.wrote = true;
    Ok(E::wrap(frame.slice_from(CHANGE_EVENT_HEADER_BYTE_COUNT)?))
  }
}
