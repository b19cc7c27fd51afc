use num_traits::{FromPrimitive, ToPrimitive};

use super::sample::{SampleType, SignalSample};
use crate::{
  memory::{MemoryAccessor, MemoryOffset},
  reconciler::MessageWriter,
  result::{AccessError, AccessResult},
};

/// Packet header: `[sampleType:4][numChannels:4][framesPerSecond:4][frameCount:4]`,
/// followed by `frameCount × numChannels` interleaved samples.
pub const SIGNAL_PACKET_HEADER_BYTE_COUNT: usize = 16;

/// View over a signal packet payload (the message bytes of a signal
/// Message). Samples are frame-interleaved: all channels of frame 0, then
/// all channels of frame 1, and so on.
pub struct SignalPacket {
  accessor: MemoryAccessor,
}

impl SignalPacket {
  pub fn wrap(accessor: MemoryAccessor) -> Self {
    Self { accessor }
  }

  pub fn accessor(&self) -> &MemoryAccessor {
    &self.accessor
  }

  pub fn sample_type(&self) -> AccessResult<SampleType> {
    let raw: u32 = self.accessor.read_value(&mut MemoryOffset(0))?;
    SampleType::from_u32(raw).ok_or(AccessError::Malformed("unknown sample type tag"))
  }

  pub fn set_sample_type(&self, sample_type: SampleType) -> AccessResult<()> {
    self
      .accessor
      .write_value(&sample_type.to_u32().unwrap_or(0), &mut MemoryOffset(0))
  }

  pub fn num_channels(&self) -> AccessResult<i32> {
    self.accessor.read_value(&mut MemoryOffset(4))
  }

  pub fn set_num_channels(&self, num_channels: i32) -> AccessResult<()> {
    self.accessor.write_value(&num_channels, &mut MemoryOffset(4))
  }

  pub fn frames_per_second(&self) -> AccessResult<i32> {
    self.accessor.read_value(&mut MemoryOffset(8))
  }

  pub fn set_frames_per_second(&self, frames_per_second: i32) -> AccessResult<()> {
    self
      .accessor
      .write_value(&frames_per_second, &mut MemoryOffset(8))
  }

  pub fn frame_count(&self) -> AccessResult<i32> {
    self.accessor.read_value(&mut MemoryOffset(12))
  }

  pub fn set_frame_count(&self, frame_count: i32) -> AccessResult<()> {
    self.accessor.write_value(&frame_count, &mut MemoryOffset(12))
  }

  /// Window over the raw sample bytes.
  pub fn sample_data(&self) -> AccessResult<MemoryAccessor> {
    self.accessor.slice_from(SIGNAL_PACKET_HEADER_BYTE_COUNT)
  }

  /// Exact packet size for the declared header fields, excluding any
  /// message padding.
  pub fn packet_byte_count(&self) -> AccessResult<usize> {
    let frames = self.frame_count()?.max(0) as usize;
    let channels = self.num_channels()?.max(0) as usize;
    let sample = self.sample_type()?.byte_count();
    Ok(SIGNAL_PACKET_HEADER_BYTE_COUNT + frames * channels * sample)
  }

  /// Decodes all declared samples. The packet's tag must match `T`.
  pub fn samples<T: SignalSample>(&self) -> AccessResult<Vec<T>> {
    if self.sample_type()? != T::SAMPLE_TYPE {
      return Err(AccessError::Malformed("sample type tag mismatch"));
    }
    let count = (self.frame_count()?.max(0) as usize) * (self.num_channels()?.max(0) as usize);
    let data = self.sample_data()?;
    let mut cursor = MemoryOffset::new();
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
      out.push(data.read_value::<T>(&mut cursor)?);
    }
    Ok(out)
  }

  /// Writes `samples` as the packet body, in interleaved order.
  pub fn write_samples<T: SignalSample>(&self, samples: &[T]) -> AccessResult<()> {
    let data = self.sample_data()?;
    let mut cursor = MemoryOffset::new();
    for sample in samples {
      data.write_value(sample, &mut cursor)?;
    }
    Ok(())
  }
}

/// A signal packet reserved in the outbound message queue. The caller
/// fills the samples through [`packet`]; dropping the writer commits the
/// message for the next outbound tick.
///
/// [`packet`]: SignalPacketWriter::packet
pub struct SignalPacketWriter {
  writer: MessageWriter,
}

impl SignalPacketWriter {
  pub(crate) fn new(writer: MessageWriter) -> Self {
    Self { writer }
  }

  pub fn packet(&mut self) -> SignalPacket {
    SignalPacket::wrap(self.writer.accessor())
  }
}
