// Bounded byte windows over raw memory regions and the typed codecs that
// read and write through them. Everything on the wire — stream headers,
// change events, field data, signal samples — goes through this layer, so
// the bounds checks here are the only thing standing between a misbehaving
// peer and memory corruption.

mod accessor;
mod codecs;

pub use accessor::{MemoryAccessor, MemoryOffset};
pub use codecs::{dyn_size_of_bytes, dyn_size_of_str, WireValue};

/// Rounds `n` up to the frame alignment (8 bytes).
pub const fn align8(n: usize) -> usize {
  (n + 7) & !7
}
