use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io error at {path}: {src}")]
    Io {
        path: PathBuf,
        #[source]
        src: std::io::Error,
    },

    #[error("store file {path} is corrupt ({detail}); delete it to rebuild the cache from scratch")]
    Corrupt { path: PathBuf, detail: String },

    #[error(
        "store file {path} has schema version {found} but this build reads version {expected}; \
         refusing to open it (use a matching build, or delete the file to start over)"
    )]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("media id of {0} bytes does not fit the on-disk format")]
    OversizeId(usize),
}
