use std::fmt;

/// 128-bit object identity. Every object belongs to exactly one collection
/// and is addressed by its uuid in every change event that touches it.
///
/// The value is opaque to the runtime; it only has to be unique among the
/// participants of a connection. [`ObjectUuid::generate`] draws one from the
/// process-local RNG.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectUuid {
  pub id_high: u64,
  pub id_low: u64,
}

impl ObjectUuid {
  pub const ZERO: ObjectUuid = ObjectUuid {
    id_high: 0,
    id_low: 0,
  };

  pub const fn new(id_high: u64, id_low: u64) -> Self {
    Self { id_high, id_low }
  }

  /// Draws a fresh random uuid. Collision probability is negligible for the
  /// object counts this runtime is built for.
  pub fn generate() -> Self {
    Self {
      id_high: rand::random::<u64>(),
      id_low: rand::random::<u64>(),
    }
  }

  pub fn is_zero(&self) -> bool {
    self.id_high == 0 && self.id_low == 0
  }
}

impl fmt::Debug for ObjectUuid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ObjectUuid({:016x}-{:016x})", self.id_high, self.id_low)
  }
}

impl fmt::Display for ObjectUuid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:016x}-{:016x}", self.id_high, self.id_low)
  }
}
