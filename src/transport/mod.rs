// Shared-memory transport: a single-writer, multi-reader monotonic change
// log with a schema-gated header. One region carries one direction of a
// connection; a full duplex connection is two regions.

mod backing;
mod config;
mod events;
mod heap_memory;
#[cfg(unix)]
mod shared_memory;
mod stream;

pub use backing::BackingStore;
pub use config::TransportConfig;
pub use events::{
  size_of_frame, BareChangeEventAccessor, ChangeEvent, ChangeEventView, ChangeType,
  CollectionChangeEventAccessor, CollectionMessageEventAccessor, CollectionUpdateEventAccessor,
  FullUpdateRequestEventAccessor, CHANGE_EVENT_HEADER_BYTE_COUNT,
};
pub use heap_memory::{HeapBackingStore, HeapRegion};
#[cfg(unix)]
pub use shared_memory::SharedMemoryBackingStore;
pub use stream::{TransportStream, TransportStreamAccessor};

/// First eight bytes of every transport region.
pub const TRANSPORT_MAGIC: [u8; 8] = *b"XRPA\0STR";

/// Bumped whenever the header or frame layout changes incompatibly. A
/// version mismatch refuses the attachment the same way a schema mismatch
/// does.
pub const TRANSPORT_VERSION: u32 = 1;

/// Bit-exact header layout. All multi-byte fields are little-endian; the
/// ring follows immediately after the header.
pub(crate) mod layout {
  pub const MAGIC: usize = 0;
  pub const VERSION: usize = 8;
  // 4 reserved bytes at 12
  pub const SCHEMA_HASH: usize = 16;
  pub const RING_CAPACITY: usize = 48;
  pub const WRITE_CURSOR: usize = 56;
  pub const LAST_ENTRY_OFFSET: usize = 64;
  pub const CREATION_TIMESTAMP: usize = 72;
  pub const WRITER_LIVENESS: usize = 80;
  pub const READER_COUNT: usize = 84;
  // 8 reserved bytes at 88
  pub const RING: usize = 96;
}

/// Header size; ring bytes start here.
pub const TRANSPORT_HEADER_BYTE_COUNT: usize = layout::RING;

static_assertions::const_assert_eq!(layout::SCHEMA_HASH, 16);
static_assertions::const_assert_eq!(layout::RING_CAPACITY, layout::SCHEMA_HASH + 32);
static_assertions::const_assert_eq!(layout::WRITE_CURSOR, 56);
static_assertions::const_assert_eq!(layout::WRITER_LIVENESS, 80);
static_assertions::const_assert_eq!(TRANSPORT_HEADER_BYTE_COUNT, 96);

/// Total region size needed for a given config.
pub fn region_byte_count(config: &TransportConfig) -> usize {
  TRANSPORT_HEADER_BYTE_COUNT + config.ring_capacity() as usize
}
