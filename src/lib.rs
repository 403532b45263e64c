//! An embeddable, single-node key-value store in the Bitcask family: an
//! append-only CSV data log, an in-memory partial-key index checkpointed to
//! JSON, a bounded LRU value cache, and a two-stage background flush
//! pipeline providing write-back buffering and periodic durability.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod index;
pub mod log;
pub mod store;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::{KvStore, Store};
