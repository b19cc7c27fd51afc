use crate::structure::SchemaHash;

/// Immutable per-stream configuration, agreed out of band by all
/// participants of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
  /// Identity of the wire protocol: collections, fields and message types.
  /// Compared byte-for-byte on attach.
  pub schema_hash: SchemaHash,
  /// Requested size of the change-event log in bytes. The ring is sized to
  /// the next power of two.
  pub changelog_byte_count: u32,
}

impl TransportConfig {
  pub fn new(schema_hash: SchemaHash, changelog_byte_count: u32) -> Self {
    Self {
      schema_hash,
      changelog_byte_count,
    }
  }

  /// Actual ring size: the next power of two at or above the requested
  /// changelog size, so cursor arithmetic reduces to masking.
  pub fn ring_capacity(&self) -> u64 {
    u64::from(self.changelog_byte_count.max(1)).next_power_of_two()
  }
}
