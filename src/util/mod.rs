//! Small helpers around the operating system.

pub mod directory;

pub use directory::{ensure_directory, FileSystemError};
