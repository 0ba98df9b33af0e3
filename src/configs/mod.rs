pub mod base;
pub mod discord;
pub mod logging;
pub mod radio;
pub mod server;
pub mod session;

pub use base::*;
pub use discord::*;
pub use logging::*;
pub use radio::*;
pub use server::*;
pub use session::*;
