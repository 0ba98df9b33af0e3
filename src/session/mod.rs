pub(crate) mod playback;
pub mod registry;
pub mod state;
pub mod voice_session;

#[cfg(test)]
pub(crate) mod testing;

pub use registry::SessionRegistry;
pub use state::{SessionState, SessionStatus, Transition};
pub use voice_session::VoiceSession;
