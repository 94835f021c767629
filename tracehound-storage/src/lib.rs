//! # Tracehound Storage
//!
//! Cold-path forensic retention. Encoded evidence is framed into the
//! fixed binary envelope and persisted through a minimal object-store
//! client contract; reads return the unpacked payload for the caller to
//! verify and decode.

pub mod adapter;
pub mod client;

pub use adapter::{
    ColdStorageAdapter, ColdStorageConfig, ColdStorageError, ENVELOPE_EXTENSION,
};
pub use client::{MemoryObjectClient, ObjectStoreClient, ObjectStoreError, SledObjectClient};
