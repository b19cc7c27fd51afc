use num_derive::{FromPrimitive, ToPrimitive};
use paste::paste;

use crate::memory::WireValue;

/// Wire tag for the element type of a signal packet's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum SampleType {
  Float32 = 0,
  Float64 = 1,
  Int32 = 2,
  Int16 = 3,
  Uint8 = 4,
}

impl SampleType {
  pub const fn byte_count(self) -> usize {
    match self {
      SampleType::Float32 | SampleType::Int32 => 4,
      SampleType::Float64 => 8,
      SampleType::Int16 => 2,
      SampleType::Uint8 => 1,
    }
  }
}

/// Sample element of a signal stream. The associated constants let generic
/// producers tag packets and size buffers without a value in hand.
pub trait SignalSample: WireValue + Copy + Default + 'static {
  const SAMPLE_TYPE: SampleType;
  const BYTE_COUNT: usize;
}

macro_rules! impl_signal_sample {
  ($($ty:ty => $tag:ident),* $(,)?) => {
    $(
      impl SignalSample for $ty {
        const SAMPLE_TYPE: SampleType = SampleType::$tag;
        const BYTE_COUNT: usize = SampleType::$tag.byte_count();
      }

      paste! {
        #[cfg(test)]
        #[test]
        fn [<sample_size_matches_wire_size_ $ty>]() {
          let value = <$ty>::default();
          assert_eq!(value.wire_size(), <$ty as SignalSample>::BYTE_COUNT);
        }
      }
    )*
  };
}

impl_signal_sample! {
  f32 => Float32,
  f64 => Float64,
  i32 => Int32,
  i16 => Int16,
  u8 => Uint8,
}
