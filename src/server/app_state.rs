use std::sync::Arc;

use crate::{commands::CommandFacade, configs::Config, voice::VoiceBridge};

/// Top-level application state.
pub struct AppState {
    pub facade: Arc<CommandFacade>,
    /// The bot shell's end of voice connections.
    pub bridge: Arc<VoiceBridge>,
    pub config: Config,
}
