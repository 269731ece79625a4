use std::io;

use catalog_core::CatalogError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("logger initialization failed: {0}")]
    Logger(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid seed {origin}: {message}")]
    Seed { origin: String, message: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type HostResult<T> = std::result::Result<T, HostError>;
