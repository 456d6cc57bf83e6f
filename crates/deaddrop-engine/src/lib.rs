//! Server-side drop lifecycle: storing ciphertext, handing out time-boxed
//! access, spending download budgets, and purging dead drops.
//!
//! All policy lives in [`LifecycleEngine`]. The record store
//! ([`deaddrop_db::RecordStore`]) and blob store ([`BlobStore`]) are
//! collaborators it drives.

pub mod error;
pub mod lifecycle;
pub mod storage;
pub mod webhook;

pub use error::DropError;
pub use lifecycle::{DownloadGrant, EngineConfig, LifecycleEngine, NewDrop};
pub use storage::{BlobStore, DiskStorage, SignedAccess};
pub use webhook::WebhookNotice;
