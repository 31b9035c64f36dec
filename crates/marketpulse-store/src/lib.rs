//! Crash-safe JSON persistence for crawl output.
//!
//! [`FileStore`] owns the per-job directory tree and the merge-and-rewrite
//! save discipline; [`IncrementalSaver`] layers periodic background flushing
//! on top so long crawls persist as they go.

pub mod error;
pub mod file_store;
pub mod saver;

pub use error::StoreError;
pub use file_store::FileStore;
pub use saver::{IncrementalSaver, SaverHandle};
