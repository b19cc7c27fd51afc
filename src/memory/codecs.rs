use byteorder::{ByteOrder, LittleEndian};
use paste::paste;

use super::{align8, MemoryAccessor, MemoryOffset};
use crate::{
  result::{AccessError, AccessResult},
  structure::{ObjectUuid, SchemaHash},
};

/// A value with a defined little-endian wire layout.
///
/// `wire_size` is the exact number of bytes `write_to` advances the cursor
/// by, padding included. Writers sum these before reserving ring space, so
/// the two must never drift apart.
pub trait WireValue: Sized {
  fn wire_size(&self) -> usize;

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self>;

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()>;
}

macro_rules! impl_wire_primitive {
  ($($ty:ident : $bytes:literal),* $(,)?) => {
    $(
      paste! {
        impl WireValue for $ty {
          fn wire_size(&self) -> usize {
            $bytes
          }

          fn read_from(
            accessor: &MemoryAccessor,
            offset: &mut MemoryOffset,
          ) -> AccessResult<Self> {
            let mut buf = [0u8; $bytes];
            accessor.copy_out(offset.0, &mut buf)?;
            offset.advance($bytes);
            Ok(LittleEndian::[<read_ $ty>](&buf))
          }

          fn write_to(
            &self,
            accessor: &MemoryAccessor,
            offset: &mut MemoryOffset,
          ) -> AccessResult<()> {
            let mut buf = [0u8; $bytes];
            LittleEndian::[<write_ $ty>](&mut buf, *self);
            accessor.copy_in(offset.0, &buf)?;
            offset.advance($bytes);
            Ok(())
          }
        }
      }
    )*
  };
}

impl_wire_primitive! {
  i16: 2, u16: 2,
  i32: 4, u32: 4,
  i64: 8, u64: 8,
  f32: 4, f64: 8,
}

impl WireValue for u8 {
  fn wire_size(&self) -> usize {
    1
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    let mut buf = [0u8; 1];
    accessor.copy_out(offset.0, &mut buf)?;
    offset.advance(1);
    Ok(buf[0])
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    accessor.copy_in(offset.0, &[*self])?;
    offset.advance(1);
    Ok(())
  }
}

// Booleans travel as int32 0/1, per the field encoding defaults.
impl WireValue for bool {
  fn wire_size(&self) -> usize {
    4
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    Ok(i32::read_from(accessor, offset)? != 0)
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    (i32::from(*self)).write_to(accessor, offset)
  }
}

impl WireValue for ObjectUuid {
  fn wire_size(&self) -> usize {
    16
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    let id_high = u64::read_from(accessor, offset)?;
    let id_low = u64::read_from(accessor, offset)?;
    Ok(ObjectUuid { id_high, id_low })
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    self.id_high.write_to(accessor, offset)?;
    self.id_low.write_to(accessor, offset)
  }
}

impl WireValue for SchemaHash {
  fn wire_size(&self) -> usize {
    32
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    let mut words = [0u64; 4];
    for w in words.iter_mut() {
      *w = u64::read_from(accessor, offset)?;
    }
    Ok(SchemaHash(words))
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    for w in self.0.iter() {
      w.write_to(accessor, offset)?;
    }
    Ok(())
  }
}

// Length-prefixed byte payloads: u32 length, bytes, zero padding rounding
// the whole unit to the frame alignment. The padding keeps frame byte counts
// at 8-byte multiples without per-field bookkeeping in the bindings.

fn read_length_prefixed(
  accessor: &MemoryAccessor,
  offset: &mut MemoryOffset,
) -> AccessResult<Vec<u8>> {
  let at = offset.0;
  let mut probe = MemoryOffset(at);
  let len = u32::read_from(accessor, &mut probe)? as usize;
  let unit = align8(4 + len);
  if at.checked_add(unit).map_or(true, |end| end > accessor.len()) {
    return Err(AccessError::Malformed("length prefix exceeds window"));
  }
  let mut bytes = vec![0u8; len];
  accessor.copy_out(at + 4, &mut bytes)?;
  offset.advance(unit);
  Ok(bytes)
}

fn write_length_prefixed(
  bytes: &[u8],
  accessor: &MemoryAccessor,
  offset: &mut MemoryOffset,
) -> AccessResult<()> {
  let at = offset.0;
  let unit = align8(4 + bytes.len());
  // bounds-check the whole unit up front so a padding failure cannot leave
  // a torn value behind
  accessor.check_span(at, unit)?;
  let mut cursor = MemoryOffset(at);
  (bytes.len() as u32).write_to(accessor, &mut cursor)?;
  accessor.copy_in(at + 4, bytes)?;
  accessor.zero_fill(at + 4 + bytes.len(), unit - 4 - bytes.len())?;
  offset.advance(unit);
  Ok(())
}

impl WireValue for String {
  fn wire_size(&self) -> usize {
    dyn_size_of_str(self)
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    let bytes = read_length_prefixed(accessor, offset)?;
    String::from_utf8(bytes).map_err(|_| AccessError::Malformed("string is not valid UTF-8"))
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    write_length_prefixed(self.as_bytes(), accessor, offset)
  }
}

impl WireValue for Vec<u8> {
  fn wire_size(&self) -> usize {
    dyn_size_of_bytes(self)
  }

  fn read_from(accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<Self> {
    read_length_prefixed(accessor, offset)
  }

  fn write_to(&self, accessor: &MemoryAccessor, offset: &mut MemoryOffset) -> AccessResult<()> {
    write_length_prefixed(self, accessor, offset)
  }
}

/// Dynamic wire contribution of a string field: length prefix, UTF-8 bytes
/// and padding to the frame alignment.
pub fn dyn_size_of_str(value: &str) -> usize {
  align8(4 + value.len())
}

/// Dynamic wire contribution of a byte-vector field.
pub fn dyn_size_of_bytes(value: &[u8]) -> usize {
  align8(4 + value.len())
}
