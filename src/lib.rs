//! Link2Video backend: fetches media from a URL with yt-dlp, reconciles it
//! into the requested container with ffmpeg and serves the result.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod selection;
pub mod staging;
pub mod store;
pub mod tools;
pub mod transcode;

pub use error::{Error, ErrorKind, Result};
pub use pipeline::{FinalArtifact, MediaService, ServiceOptions};
pub use selection::RequestSpec;
