use std::fmt;

/// 256-bit digest over the full set of collection, field and message-type
/// declarations of a data store. Two participants may only exchange events
/// when their hashes are byte-equal; the transport refuses the attachment
/// otherwise.
///
/// The hash is computed by schema tooling and arrives here as an opaque
/// constant. Stored and serialized as four little-endian 64-bit words.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaHash(pub [u64; 4]);

impl SchemaHash {
  pub const fn new(w0: u64, w1: u64, w2: u64, w3: u64) -> Self {
    Self([w0, w1, w2, w3])
  }

  pub fn words(&self) -> &[u64; 4] {
    &self.0
  }
}

impl fmt::Debug for SchemaHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SchemaHash({self})")
  }
}

impl fmt::Display for SchemaHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{:016x}{:016x}{:016x}{:016x}",
      self.0[0], self.0[1], self.0[2], self.0[3]
    )
  }
}
