use std::cell::RefCell;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::packet::SignalPacket;
use crate::{reconciler::CollectionHandle, structure::ObjectUuid};

/// Re-emits every received signal packet to a set of outbound recipients.
///
/// The forwarder runs inside inbound dispatch: the owning object's signal
/// message handler hands it each packet, and the copies are queued for the
/// same process's next outbound tick. Sample bytes pass through untouched.
#[derive(Default)]
pub struct InboundSignalForwarder {
  recipients: RefCell<Vec<(ObjectUuid, CollectionHandle, i32)>>,
}

impl InboundSignalForwarder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds an outbound signal endpoint: packets are re-sent from `id` on
  /// its collection's message channel under `message_type`.
  pub fn add_recipient(&self, id: ObjectUuid, handle: CollectionHandle, message_type: i32) {
    self.recipients.borrow_mut().push((id, handle, message_type));
  }

  pub fn recipient_count(&self) -> usize {
    self.recipients.borrow().len()
  }

  /// Forwards one inbound packet to every recipient.
  pub fn on_signal_data(&self, _timestamp: u64, packet: &SignalPacket) {
    let byte_count = match packet.packet_byte_count() {
      Ok(n) => n,
      Err(e) => {
        warn!("dropping unforwardable signal packet: {e}");
        return;
      }
    };
    let mut bytes = vec![0u8; byte_count];
    if let Err(e) = packet.accessor().copy_out(0, &mut bytes) {
      warn!("dropping truncated signal packet: {e}");
      return;
    }

    for (id, handle, message_type) in self.recipients.borrow().iter() {
      let Some(mut writer) = handle.send_message(*id, *message_type, byte_count) else {
        trace!("signal forward dropped: recipient handle is unbound");
        continue;
      };
      if let Err(e) = writer.accessor().copy_in(0, &bytes) {
        error!("failed to copy forwarded signal packet: {e}");
      }
    }
  }
}
