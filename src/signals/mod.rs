// Signal channel: a higher-rate streaming discipline layered on the message
// channel. A signal packet is an ordinary Message whose payload starts with
// a small sample-format header followed by frame-interleaved samples, so
// packets inherit the stream's total ordering and overrun detection.

mod forwarder;
mod outbound;
mod packet;
mod ring_buffer;
mod sample;

pub use forwarder::InboundSignalForwarder;
pub use outbound::{send_signal, OutboundSignalData, SignalProducerCallback};
pub use packet::{SignalPacket, SignalPacketWriter, SIGNAL_PACKET_HEADER_BYTE_COUNT};
pub use ring_buffer::SignalRingBuffer;
pub use sample::{SampleType, SignalSample};
