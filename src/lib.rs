//! Shared-memory dataflow runtime.
//!
//! Participant processes on one host exchange typed objects, field
//! updates, discrete messages and continuous signal streams through
//! shared-memory rings. Three layers make up the crate:
//!
//! - [`transport`] — a single-writer, multi-reader monotonic change log
//!   with a schema-gated header ([`TransportStream`]), carried by an
//!   injected [`BackingStore`] (heap or named shared memory).
//! - [`reconciler`] — per-process mirror state: a [`DataStoreReconciler`]
//!   drives inbound events into registered [`ObjectCollection`]s and
//!   flushes dirty local objects outbound, with secondary indexes and a
//!   full-update recovery handshake on overrun.
//! - [`signals`] — sample streaming layered on the message channel:
//!   callback, ring-buffer and forwarder producers on the outbound side,
//!   typed packet views on the inbound side.
//!
//! Schema-generated bindings sit on top of this crate; the test suites
//! carry hand-written bindings in the same shape.
//!
//! ```
//! use shmflow::{
//!   SchemaHash, TransportConfig, TransportStream,
//! };
//!
//! let config = TransportConfig::new(SchemaHash::new(1, 2, 3, 4), 8192);
//! let stream = TransportStream::open_heap("ExampleRegion", &config).unwrap();
//! assert_eq!(stream.ring_capacity(), 8192);
//! ```

pub mod memory;
pub mod reconciler;
pub mod result;
pub mod signals;
pub mod structure;
pub mod transport;

pub use crate::{
  memory::{MemoryAccessor, MemoryOffset, WireValue},
  reconciler::{
    CollectionHandle, CollectionIndexBinding, DataStoreReconciler, MessageWriter,
    ObjectCollection, ObjectCollectionIndex, ReconciledObject,
  },
  result::{AccessError, AccessResult, TransportError, TransportResult},
  signals::{
    InboundSignalForwarder, OutboundSignalData, SampleType, SignalPacket, SignalRingBuffer,
    SignalSample,
  },
  structure::{ClockSource, ObjectUuid, SchemaHash, SystemClock},
  transport::{
    BackingStore, ChangeType, HeapRegion, TransportConfig, TransportStream,
    TransportStreamAccessor,
  },
};
