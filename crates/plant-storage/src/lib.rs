//! Object and document store clients for Plant Share.
//!
//! The [`ObjectStore`] and [`DocumentStore`] traits are the seams the upload
//! pipeline and the feeds are written against. Implementations:
//!
//! - [`firebase::FirebaseStorage`] / [`firebase::Firestore`]: the platform's
//!   REST API.
//! - [`local::LocalObjectStore`]: a directory on disk, for offline runs.
//!   The SQLite document store lives in `plant-db`.

pub mod credential;
pub mod error;
pub mod firebase;
pub mod keys;
pub mod live;
pub mod local;
pub mod traits;

pub use credential::{Credential, CredentialPlacement};
pub use error::{StorageError, StorageResult};
pub use live::{ChangeFeed, Snapshot, Subscription};
pub use traits::{DocumentStore, ObjectStore};
