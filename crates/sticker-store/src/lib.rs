//! Persistent sticker store
//!
//! Maps a sticker id (the request path) to its image payload in a local
//! SQLite database. Records are insert-only: a second write for an existing
//! id fails with [`StoreError::DuplicateKey`] and the stored payload is kept.

mod error;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use store::StickerStore;
pub use types::{CachedAsset, Lookup, Payload, StoreConfig, StoreStats};
