//! Object store access for LapCompare.
//!
//! This crate provides:
//! - Download/upload against an S3-compatible endpoint
//! - Presigned GET/PUT URLs and client upload slots
//! - Result publishing (artifacts plus `manifest.json`)

pub mod client;
pub mod config;
pub mod error;
pub mod publish;
pub mod signer;

pub use client::ObjectStoreClient;
pub use config::{StorageConfig, DEFAULT_PREFIX, DEFAULT_PRESIGN_TTL};
pub use error::{StorageError, StorageResult};
pub use publish::content_type_for;
pub use signer::UploadSigner;
