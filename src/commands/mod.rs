pub mod facade;

pub use facade::{CommandFacade, StatusPayload};
