//! Error types for the file blob cache

use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    EmptyKey,
    DirectoryCreate(PathBuf, Box<io::Error>),
    Read(String, Box<io::Error>),
    Write(String, Box<io::Error>),
    Delete(String, Box<io::Error>),
    List(PathBuf, Box<io::Error>),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::EmptyKey => write!(f, "Cache key cannot be empty"),
            CacheError::DirectoryCreate(path, err) => {
                write!(f, "Failed to create {}: {}", path.display(), err)
            }
            CacheError::Read(key, err) => write!(f, "Failed to read '{}': {}", key, err),
            CacheError::Write(key, err) => write!(f, "Failed to write '{}': {}", key, err),
            CacheError::Delete(key, err) => write!(f, "Failed to delete '{}': {}", key, err),
            CacheError::List(path, err) => {
                write!(f, "Failed to list {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::EmptyKey => None,
            CacheError::DirectoryCreate(_, err)
            | CacheError::Read(_, err)
            | CacheError::Write(_, err)
            | CacheError::Delete(_, err)
            | CacheError::List(_, err) => Some(err.as_ref()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
