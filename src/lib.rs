//! Bucketmeta - a bucket-scoped metadata service
//!
//! A single master process owns an embedded ordered key-value store,
//! partitioned into per-bucket namespaces advertised through an on-disk
//! manifest. Worker processes reach it over a small length-framed RPC
//! protocol and expose an object-storage-shaped API on top:
//! - Bucket and object CRUD backed by a distinguished metastore namespace
//! - Prefix/delimiter and multipart-upload listing with ranged,
//!   early-terminating scans
//! - Ref-counted worker sessions with deferred reconnect on manifest change

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod manifest;
pub mod master;
pub mod metastore;
pub mod namespace;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod types;

pub use error::{Error, Result};
