use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("couldn't serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no home directory to keep settings in")]
    NoProjectDirs,

    #[error("couldn't watch settings file: {0}")]
    Watch(#[from] notify::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
