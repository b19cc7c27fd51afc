// Error types for the transport and reconciliation core.
//
// The split mirrors the two failure domains: `AccessError` covers byte-level
// codec failures inside a single memory window, `TransportError` covers
// stream-level attach and consume failures. Tick entry points never surface
// either across the host boundary; they log and recover.

use thiserror::Error;

use crate::structure::SchemaHash;

/// Byte-level failure while reading or writing through a [`MemoryAccessor`].
///
/// [`MemoryAccessor`]: crate::memory::MemoryAccessor
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
  /// The access would cross the accessor's declared window. No partial
  /// write is observable when this is returned.
  #[error("access of {count} bytes at offset {offset} crosses a {window} byte window")]
  OutOfBounds {
    offset: usize,
    count: usize,
    window: usize,
  },

  /// A value failed structural validation, e.g. a length prefix larger than
  /// the remaining window or non-UTF-8 string bytes.
  #[error("malformed value: {0}")]
  Malformed(&'static str),
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Stream-level failure on attach or while consuming a transport ring.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The shared region carries a different schema hash than the caller's
  /// config. The connection is refused before any event is processed.
  #[error("schema hash mismatch: local {local}, region carries {found}")]
  SchemaMismatch { local: SchemaHash, found: SchemaHash },

  /// The shared region was written by an incompatible runtime version.
  #[error("transport version mismatch: supported {supported}, found {found}")]
  VersionMismatch { supported: u32, found: u32 },

  /// The region does not start with the transport magic, or a header field
  /// is structurally impossible.
  #[error("corrupt transport header: {0}")]
  CorruptHeader(&'static str),

  /// The backing region is smaller than header + ring.
  #[error("backing region for {name:?} is {actual} bytes, need {needed}")]
  RegionTooSmall {
    name: String,
    actual: usize,
    needed: usize,
  },

  /// The reader's lag exceeds the ring capacity; its mirror is stale and
  /// must be rebuilt through the full-update handshake.
  #[error("reader overrun: lag {lag} exceeds ring capacity {capacity}")]
  Overrun { lag: u64, capacity: u64 },

  /// The writer liveness generation changed since this reader attached.
  /// Equivalent to an overrun of unknown magnitude.
  #[error("writer generation changed from {expected} to {found}")]
  WriterDisappeared { expected: u32, found: u32 },

  /// A frame header in the ring is invalid, so frame boundaries are lost.
  /// Also treated as an overrun by consumers.
  #[error("corrupt change event at cursor {cursor}: byte count {byte_count}")]
  CorruptFrame { cursor: u64, byte_count: u32 },

  /// A frame could not be reserved because it exceeds the ring capacity.
  /// This is a caller sizing error, surfaced synchronously.
  #[error("frame of {byte_count} bytes exceeds ring capacity {capacity}")]
  FrameTooLarge { byte_count: usize, capacity: u64 },

  #[error("codec failure: {0}")]
  Access(#[from] AccessError),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
  /// True for the failures that invalidate a reader's mirror and require
  /// the full-update recovery handshake.
  pub fn requires_full_update(&self) -> bool {
    matches!(
      self,
      TransportError::Overrun { .. }
        | TransportError::WriterDisappeared { .. }
        | TransportError::CorruptFrame { .. }
    )
  }
}
