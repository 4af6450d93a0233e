//! Chunked Upload Module
//!
//! Protocol Flow:
//! 1. Client opens a session and receives an upload id
//! 2. Client uploads chunks keyed by byte offset, in any order
//! 3. Client completes the session; chunks are concatenated in offset order
//! 4. The artifact is handed to remote storage in the background

pub mod assembler;
pub mod chunk_store;
pub mod handoff;
pub mod session;
pub mod types;

pub use assembler::SessionAssembler;
pub use chunk_store::ChunkStore;
pub use handoff::{RemoteObject, StorageHandoff};
pub use session::SessionRegistry;
pub use types::*;
