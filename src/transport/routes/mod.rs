pub mod commands;
pub mod info;
