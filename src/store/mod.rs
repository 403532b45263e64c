pub mod flush;
mod store;

pub use store::KvStore;

use crate::error::Result;

/// The operation surface embedders and the command driver program against.
///
/// Writes are asynchronous because they buffer through the flush pipeline
/// and may wait for queue capacity; reads resolve entirely on the caller's
/// thread.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Stores a value, replacing any previous value for the key.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Returns the latest value for the key.
    fn get(&self, key: &str) -> Result<String>;

    /// Deletes the key. Deleting an absent key succeeds.
    async fn del(&self, key: &str) -> Result<()>;
}
