//! Logger setup for the renderer and its demo binary.

mod init;

pub use init::{init_logging, LoggingConfig};
