//! Daemon status storage trait.

use crate::StoreError;
use coda_types::DaemonStatus;

/// Trait for the `daemonstatus` relation. Snapshots are append-only; a
/// second snapshot with the same timestamp is ignored.
pub trait StatusStore {
    fn save_daemon_status(&self, status: &DaemonStatus) -> Result<(), StoreError>;

    fn latest_daemon_status(&self) -> Result<Option<DaemonStatus>, StoreError>;
}
