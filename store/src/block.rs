//! Block storage trait.

use crate::StoreError;
use coda_types::{Block, BlockSummary, StateHash};

/// Trait for the `blocks` relation and its three child relations.
pub trait BlockStore {
    /// Check if a block is already present.
    fn block_exists(&self, hash: &StateHash) -> Result<bool, StoreError>;

    /// Insert a block with its user jobs, snark jobs and fee transfers as one
    /// unit. The block is always stored as non-canonical. Duplicate rows are
    /// ignored; returns `false` when the block row already existed.
    fn save_block(&self, block: &Block) -> Result<bool, StoreError>;

    /// Retrieve a block with its child collections ordered by index.
    fn get_block(&self, hash: &StateHash) -> Result<Option<Block>, StoreError>;

    /// The `limit` highest blocks, ordered by height descending and then by
    /// state hash.
    fn recent_blocks(&self, limit: usize) -> Result<Vec<BlockSummary>, StoreError>;

    /// Every block at `height` or above, ordered by height descending and
    /// then by state hash.
    fn blocks_from_height(&self, height: u64) -> Result<Vec<BlockSummary>, StoreError>;

    /// The canonical block at `height`, with its child collections.
    fn canonical_block_at(&self, height: u64) -> Result<Option<Block>, StoreError>;

    /// Height of the highest stored block.
    fn max_height(&self) -> Result<Option<u64>, StoreError>;

    /// Flag a block canonical and credit every account it references.
    /// Returns `false` if the block was already canonical.
    fn mark_canonical(&self, hash: &StateHash) -> Result<bool, StoreError>;

    /// Flag a block orphaned and debit every account it references.
    /// Returns `false` if the block was already non-canonical.
    fn mark_orphaned(&self, hash: &StateHash) -> Result<bool, StoreError>;

    /// Physically remove a block and its child rows. A block that is still
    /// canonical is demoted first, inside the same transaction, so its
    /// counters are reversed exactly once. Returns `false` if the block does
    /// not exist.
    fn rollback_block(&self, hash: &StateHash) -> Result<bool, StoreError>;

    /// Orphans strictly below `height`, lowest first: non-canonical blocks
    /// whose height already has a canonical block. Blocks no pass has
    /// settled yet are never listed.
    fn orphaned_below(&self, height: u64, limit: usize) -> Result<Vec<BlockSummary>, StoreError>;

    /// Total number of blocks in the store.
    fn block_count(&self) -> Result<u64, StoreError>;
}
