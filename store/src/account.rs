//! Account storage trait.

use crate::StoreError;
use coda_types::{Account, PublicKey};

/// Trait for the `accounts` relation.
pub trait AccountStore {
    /// Upsert an account snapshot.
    ///
    /// On conflict the node-sourced fields are replaced, `first_seen` and
    /// `last_seen` are widened (min/max) and the counters are left untouched.
    fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    fn get_account(&self, public_key: &PublicKey) -> Result<Option<Account>, StoreError>;

    fn account_count(&self) -> Result<u64, StoreError>;
}
