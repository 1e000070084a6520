//! Persisted snapshot of every store.
//!
//! All local state lives in one [`UserData`] value serialized under a single
//! datastore key, so a commit is a single durable write. Mutations are made
//! on a clone and only swapped in after the write succeeds.

use crate::datastore::Datastore;
use crate::purchases::PurchaseStore;
use crate::tokens::TokenStore;
use crate::{PsiCashError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Datastore key of the snapshot.
pub const USER_DATA_KEY: &str = "user_data";

/// Snapshot schema version.
pub const USER_DATA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub version: u32,
    pub tokens: TokenStore,
    /// Display cache of the server-held balance.
    pub balance: i64,
    /// Server clock minus local clock, from the last reply's `Date`.
    pub server_time_diff_ms: i64,
    pub purchases: PurchaseStore,
    /// Caller-supplied context echoed on every request.
    pub request_metadata: BTreeMap<String, String>,
}

impl Default for UserData {
    fn default() -> Self {
        Self {
            version: USER_DATA_VERSION,
            tokens: TokenStore::default(),
            balance: 0,
            server_time_diff_ms: 0,
            purchases: PurchaseStore::default(),
            request_metadata: BTreeMap::new(),
        }
    }
}

impl UserData {
    /// Load the snapshot, or an empty one if none was ever written.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the snapshot is unreadable or from an unknown
    /// schema version. Recovery goes through an explicit reset.
    pub fn load(store: &dyn Datastore) -> Result<Self> {
        let Some(bytes) = store.get(USER_DATA_KEY)? else {
            return Ok(Self::default());
        };

        let data: UserData = serde_json::from_slice(&bytes).map_err(|e| {
            PsiCashError::Storage(format!("persisted state is corrupt: {}", e))
        })?;

        if data.version != USER_DATA_VERSION {
            return Err(PsiCashError::Storage(format!(
                "persisted state has version {}, expected {}",
                data.version, USER_DATA_VERSION
            )));
        }

        Ok(data)
    }

    /// Durably write this snapshot.
    pub fn save(&self, store: &dyn Datastore) -> Result<()> {
        let bytes = serde_json::to_vec(self)?;
        store.put(USER_DATA_KEY, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDatastore;

    #[test]
    fn test_missing_snapshot_is_empty() {
        let store = MemoryDatastore::new();
        assert_eq!(UserData::load(&store).unwrap(), UserData::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryDatastore::new();
        let mut data = UserData {
            balance: 250,
            ..Default::default()
        };
        data.request_metadata
            .insert("client_version".to_string(), "7".to_string());
        data.save(&store).unwrap();

        assert_eq!(UserData::load(&store).unwrap(), data);
    }

    #[test]
    fn test_corrupt_snapshot_is_a_storage_error() {
        let store = MemoryDatastore::new();
        store.put(USER_DATA_KEY, b"{ not json").unwrap();
        assert!(matches!(
            UserData::load(&store),
            Err(PsiCashError::Storage(_))
        ));
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let store = MemoryDatastore::new();
        let data = UserData {
            version: 99,
            ..Default::default()
        };
        data.save(&store).unwrap();
        assert!(UserData::load(&store).is_err());
    }
}
