pub mod bridge;
pub mod protocol;
pub mod transport;

pub use bridge::VoiceBridge;
pub use transport::{
    ConnectionHandle, TransportEvent, TransportEventReceiver, TransportEventSender, VoiceTransport,
};
