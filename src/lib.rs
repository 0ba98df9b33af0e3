pub mod commands;
pub mod common;
pub mod configs;
pub mod metadata;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;
pub mod voice;
