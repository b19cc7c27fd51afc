use std::{cell::RefCell, rc::Rc};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{
  packet::{SignalPacket, SignalPacketWriter, SIGNAL_PACKET_HEADER_BYTE_COUNT},
  ring_buffer::SignalRingBuffer,
  sample::SignalSample,
};
use crate::{reconciler::CollectionHandle, result::AccessResult, structure::ObjectUuid};

/// Fills `buffer` with up to `buffer.len() / num_channels` interleaved
/// frames starting at absolute frame position `start_frame`; returns the
/// number of frames produced. Producing fewer than requested ends the
/// current tick's emission.
pub type SignalProducerCallback<T> = Box<dyn FnMut(&mut [T], i32, u64) -> usize>;

enum SignalSource<T: SignalSample> {
  Callback(SignalProducerCallback<T>),
  Ring(Rc<RefCell<SignalRingBuffer<T>>>),
}

/// Outbound side of one object's signal: owns the producer discipline and
/// turns it into signal packets on each outbound tick.
///
/// Callback sources are paced against elapsed time — the producer is asked
/// for exactly the frames needed to keep `frames_per_second` — while ring
/// sources drain whatever their producer has deposited, bounded per tick.
pub struct OutboundSignalData<T: SignalSample> {
  source: Option<SignalSource<T>>,
  num_channels: i32,
  frames_per_second: i32,
  frames_per_packet: i32,
  recipient: Option<(ObjectUuid, CollectionHandle, i32)>,
  frame_position: u64,
  start_time_us: Option<u64>,
  scratch: Vec<T>,
}

impl<T: SignalSample> Default for OutboundSignalData<T> {
  fn default() -> Self {
    Self {
      source: None,
      num_channels: 0,
      frames_per_second: 0,
      frames_per_packet: 0,
      recipient: None,
      frame_position: 0,
      start_time_us: None,
      scratch: Vec::new(),
    }
  }
}

impl<T: SignalSample> OutboundSignalData<T> {
  /// Installs a pull-mode producer invoked from the outbound tick.
  pub fn set_signal_source_callback(
    &mut self,
    callback: SignalProducerCallback<T>,
    num_channels: i32,
    frames_per_second: i32,
    frames_per_packet: i32,
  ) {
    self.source = Some(SignalSource::Callback(callback));
    self.configure(num_channels, frames_per_second, frames_per_packet);
  }

  /// Installs a ring-buffer producer drained by the outbound tick.
  pub fn set_signal_source_ring_buffer(
    &mut self,
    ring: Rc<RefCell<SignalRingBuffer<T>>>,
    num_channels: i32,
    frames_per_second: i32,
    frames_per_packet: i32,
  ) {
    self.source = Some(SignalSource::Ring(ring));
    self.configure(num_channels, frames_per_second, frames_per_packet);
  }

  /// Detaches any installed producer; ticks become no-ops until a new
  /// source is set.
  pub fn clear_signal_source(&mut self) {
    self.source = None;
  }

  fn configure(&mut self, num_channels: i32, frames_per_second: i32, frames_per_packet: i32) {
    self.num_channels = num_channels.max(1);
    self.frames_per_second = frames_per_second.max(1);
    self.frames_per_packet = frames_per_packet.max(1);
    self.frame_position = 0;
    self.start_time_us = None;
  }

  /// Addresses emitted packets: the owning object's id, its collection
  /// handle and the schema's signal message type.
  pub fn set_recipient(&mut self, id: ObjectUuid, handle: CollectionHandle, message_type: i32) {
    self.recipient = Some((id, handle, message_type));
  }

  /// Reserves a packet of `frame_count` frames for the caller to fill
  /// directly, bypassing any installed source.
  pub fn send_signal_packet(
    &mut self,
    frame_count: i32,
    num_channels: i32,
    frames_per_second: i32,
  ) -> Option<SignalPacketWriter> {
    let (id, handle, message_type) = self.recipient.clone()?;
    send_signal::<T>(
      &handle,
      id,
      message_type,
      frame_count,
      num_channels,
      frames_per_second,
    )
  }

  /// Advances the producer; called from the owning object's tick.
  pub fn tick(&mut self) {
    let Some((id, handle, message_type)) = self.recipient.clone() else {
      return;
    };
    let Some(mut source) = self.source.take() else {
      return;
    };

    match &mut source {
      SignalSource::Callback(callback) => {
        let now = handle.now_microseconds();
        let start = *self.start_time_us.get_or_insert(now);
        let elapsed = now.saturating_sub(start);
        let target = elapsed * self.frames_per_second as u64 / 1_000_000;
        while self.frame_position < target {
          let frames = (target - self.frame_position).min(self.frames_per_packet as u64) as usize;
          let samples = frames * self.num_channels as usize;
          self.scratch.resize(samples, T::default());
          let produced = callback(
            &mut self.scratch[..samples],
            self.num_channels,
            self.frame_position,
          );
          if produced == 0 {
            break;
          }
          let produced = produced.min(frames);
          self.emit(&handle, id, message_type, produced);
          self.frame_position += produced as u64;
          if produced < frames {
            break;
          }
        }
      }
      SignalSource::Ring(ring) => {
        // bound each tick to one second of frames so a stalled consumer
        // cannot make a tick arbitrarily long
        let mut budget = self.frames_per_second as usize;
        loop {
          let available = ring.borrow().available_frames();
          let frames = available
            .min(self.frames_per_packet as usize)
            .min(budget);
          if frames == 0 {
            break;
          }
          let samples = frames * self.num_channels as usize;
          self.scratch.resize(samples, T::default());
          let got = ring.borrow_mut().read_interleaved(&mut self.scratch[..samples]);
          if got == 0 {
            break;
          }
          self.emit(&handle, id, message_type, got);
          self.frame_position += got as u64;
          budget -= got;
        }
      }
    }

    self.source = Some(source);
  }

  fn emit(&self, handle: &CollectionHandle, id: ObjectUuid, message_type: i32, frames: usize) {
    let samples = frames * self.num_channels as usize;
    let Some(mut writer) = send_signal::<T>(
      handle,
      id,
      message_type,
      frames as i32,
      self.num_channels,
      self.frames_per_second,
    ) else {
      trace!("signal packet dropped: collection handle is unbound");
      return;
    };
    if let Err(e) = writer.packet().write_samples(&self.scratch[..samples]) {
      error!("failed to place signal samples: {e}");
    }
  }
}

/// Reserves an outbound signal packet addressed from `id` and writes its
/// header; the caller fills the samples.
pub fn send_signal<T: SignalSample>(
  handle: &CollectionHandle,
  id: ObjectUuid,
  message_type: i32,
  frame_count: i32,
  num_channels: i32,
  frames_per_second: i32,
) -> Option<SignalPacketWriter> {
  let sample_bytes = frame_count.max(0) as usize * num_channels.max(0) as usize * T::BYTE_COUNT;
  let byte_count = SIGNAL_PACKET_HEADER_BYTE_COUNT + sample_bytes;
  let mut writer = handle.send_message(id, message_type, byte_count)?;

  let header_result: AccessResult<()> = (|| {
    let packet = SignalPacket::wrap(writer.accessor());
    packet.set_sample_type(T::SAMPLE_TYPE)?;
    packet.set_num_channels(num_channels)?;
    packet.set_frames_per_second(frames_per_second)?;
    packet.set_frame_count(frame_count)?;
    Ok(())
  })();
  if let Err(e) = header_result {
    error!("failed to write signal packet header: {e}");
    return None;
  }
  Some(SignalPacketWriter::new(writer))
}
