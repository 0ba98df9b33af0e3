pub mod backoff;
pub mod license;
pub mod source;

pub use backoff::Backoff;
pub use license::{LicenseResolver, StreamEndpoints};
pub use source::{AudioStream, HttpStreamSource, OpenedStream, StreamSource};
