//! Client-facing key-value interface
//!
//! The same four operations are offered by a lone `DurableStore`, by a
//! primary-secondary node and by a masterless node. `simulate_failure`
//! is forwarded to the store's flush fault injection and is inert unless
//! the store was configured with it.

use crate::error::Result;
use crate::store::DurableStore;

pub trait KvService: Send + Sync {
    /// Latest live value; `KvError::NotFound` for absent or deleted keys
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()>;

    fn delete(&self, key: &str, simulate_failure: bool) -> Result<()>;

    /// All pairs or none, as far as a single node's state is concerned
    fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()>;
}

impl KvService for DurableStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        DurableStore::get(self, key)
    }

    fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()> {
        DurableStore::set(self, key, value, simulate_failure).map(|_| ())
    }

    fn delete(&self, key: &str, simulate_failure: bool) -> Result<()> {
        DurableStore::delete(self, key, simulate_failure).map(|_| ())
    }

    fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()> {
        DurableStore::bulk_set(self, items, simulate_failure).map(|_| ())
    }
}
