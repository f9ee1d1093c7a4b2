pub mod buffer;
pub mod config;
pub mod errors;
pub mod macros;
pub mod output;
#[cfg(feature = "serial")]
pub mod serial;
pub mod transfer;
