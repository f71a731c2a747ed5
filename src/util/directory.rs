use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

/// Errors on validating the backup destination.
#[derive(Debug, Display, Error)]
pub enum FileSystemError {
    /// No path was given at all.
    #[display("Backup directory is empty")]
    Empty,
    /// The path exists but isn't a directory.
    #[display("Path exists but is not a directory: {}", _0.display())]
    NotADirectory(#[error(ignore)] PathBuf),
    /// Querying the path failed for another reason than its absence.
    #[display("Unable to inspect {}: {source}", path.display())]
    Inspect { path: PathBuf, source: io::Error },
    /// The directory doesn't exist and can't be created.
    #[display("Failed to create directory {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },
}

/// Makes sure `path` is an existing directory, creating it if necessary.
pub fn ensure_directory(path: &Path) -> Result<(), FileSystemError> {
    // `Path::new("")` is neither absolute nor relative to anything useful
    if path.as_os_str().is_empty() {
        return Err(FileSystemError::Empty);
    }

    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(FileSystemError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!(target: "util::directory", "Creating directory {}", path.display());
            fs::create_dir_all(path).map_err(|source| FileSystemError::Create {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(FileSystemError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}
