use std::path::PathBuf;

use thiserror::Error;

use crate::HostError;

/// An error that ends the run. Per-video problems never show up here; they
/// are contained in the hash phase and recorded on the store entry instead.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error(transparent)]
    Store(#[from] fingerprint_store::StoreError),

    #[error("could not list media from the host: {0}")]
    Discovery(#[source] HostError),

    #[error("could not build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("could not prepare the database directory {path}: {src}")]
    DataDir {
        path: PathBuf,
        #[source]
        src: std::io::Error,
    },
}
