//! Vanish Server Library
//!
//! Chunked uploads reassembled server-side, served back with HTTP byte
//! ranges, and handed off to S3-compatible storage.
//!
//! # Modules
//!
//! - `upload`: session registry, chunk store, assembler and remote handoff
//! - `range`: single-range byte serving
//! - `storage`: remote blob storage (S3-compatible)
//! - `auth`: bearer-token identity verification
//! - `routes`: the HTTP surface

pub mod auth;
pub mod config;
pub mod error;
pub mod range;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;
