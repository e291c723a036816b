//! Daemon response shapes and their conversion into mirror types.
//!
//! The daemon encodes most amounts and heights as decimal strings and block
//! dates as JS millisecond strings. Conversion fails with `ParseError`
//! instead of substituting zeros.

use serde::Deserialize;

use coda_types::{
    parse_u64, Account, Block, DaemonStatus, FeeTransfer, ParseError, PublicKey, SnarkJob,
    StateHash, Timestamp, UserJob,
};

/// Standard GraphQL envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlErrorMessage {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentBlocksData {
    pub blocks: BlockConnection,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockConnection {
    #[serde(default)]
    pub nodes: Vec<BlockNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockData {
    pub block: Option<BlockNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlockNode {
    pub state_hash: String,
    pub protocol_state: ProtocolState,
    pub transactions: Transactions,
    #[serde(default)]
    pub snark_jobs: Vec<SnarkJobNode>,
    pub creator_account: PublicKeyNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProtocolState {
    pub previous_state_hash: String,
    pub consensus_state: ConsensusState,
    pub blockchain_state: BlockchainState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsensusState {
    pub blockchain_length: String,
    pub epoch: String,
    pub slot: String,
    pub total_currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlockchainState {
    #[serde(default)]
    pub snarked_ledger_hash: String,
    #[serde(default)]
    pub staged_ledger_hash: String,
    pub date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Transactions {
    pub coinbase: String,
    #[serde(default)]
    pub fee_transfer: Vec<FeeTransferNode>,
    #[serde(default)]
    pub user_commands: Vec<UserCommandNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeeTransferNode {
    pub fee: String,
    pub recipient: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserCommandNode {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub memo: String,
    pub fee: String,
    pub amount: String,
    pub nonce: u64,
    #[serde(default)]
    pub is_delegation: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnarkJobNode {
    pub fee: String,
    pub prover: String,
    #[serde(default)]
    pub work_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicKeyNode {
    pub public_key: String,
}

impl BlockNode {
    pub(crate) fn into_block(self) -> Result<Block, ParseError> {
        if self.state_hash.trim().is_empty() {
            return Err(ParseError::EmptyIdentifier("stateHash"));
        }
        let state_hash = StateHash::new(self.state_hash);
        let consensus = &self.protocol_state.consensus_state;
        let chain = &self.protocol_state.blockchain_state;

        let user_jobs = self
            .transactions
            .user_commands
            .into_iter()
            .enumerate()
            .map(|(i, uc)| {
                Ok(UserJob {
                    block_state_hash: state_hash.clone(),
                    index: i as u32,
                    id: uc.id,
                    sender: PublicKey::new(uc.from),
                    recipient: PublicKey::new(uc.to),
                    memo: uc.memo,
                    fee: parse_u64("userCommand.fee", &uc.fee)?,
                    amount: parse_u64("userCommand.amount", &uc.amount)?,
                    nonce: uc.nonce,
                    delegation: uc.is_delegation,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let snark_jobs = self
            .snark_jobs
            .into_iter()
            .enumerate()
            .map(|(i, sj)| {
                Ok(SnarkJob {
                    block_state_hash: state_hash.clone(),
                    index: i as u32,
                    job_ids: sj.work_ids,
                    prover: PublicKey::new(sj.prover),
                    fee: parse_u64("snarkJob.fee", &sj.fee)?,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let fee_transfers = self
            .transactions
            .fee_transfer
            .into_iter()
            .enumerate()
            .map(|(i, ft)| {
                Ok(FeeTransfer {
                    block_state_hash: state_hash.clone(),
                    index: i as u32,
                    recipient: PublicKey::new(ft.recipient),
                    fee: parse_u64("feeTransfer.fee", &ft.fee)?,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        let mut block = Block {
            state_hash: state_hash.clone(),
            previous_state_hash: StateHash::new(
                self.protocol_state.previous_state_hash.clone(),
            ),
            canonical: false,
            snarked_ledger_hash: chain.snarked_ledger_hash.clone(),
            staged_ledger_hash: chain.staged_ledger_hash.clone(),
            coinbase: parse_u64("coinbase", &self.transactions.coinbase)?,
            creator: PublicKey::new(self.creator_account.public_key),
            slot: parse_u64("slot", &consensus.slot)?,
            height: parse_u64("blockchainLength", &consensus.blockchain_length)?,
            epoch: parse_u64("epoch", &consensus.epoch)?,
            ts: Timestamp::from_js_millis(&chain.date)?,
            total_currency: parse_u64("totalCurrency", &consensus.total_currency)?,
            user_commands_count: 0,
            snark_jobs_count: 0,
            fee_transfer_count: 0,
            user_jobs,
            snark_jobs,
            fee_transfers,
        };
        block.sync_counts();
        Ok(block)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountData {
    pub account: Option<AccountNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountNode {
    pub balance: BalanceNode,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub receipt_chain_hash: Option<String>,
    #[serde(default)]
    pub delegate_account: Option<PublicKeyNode>,
    #[serde(default)]
    pub voting_for: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceNode {
    pub total: String,
}

impl AccountNode {
    pub(crate) fn into_account(self, public_key: &PublicKey) -> Result<Account, ParseError> {
        let mut account = Account::empty(public_key.clone());
        account.balance = parse_u64("balance.total", &self.balance.total)?;
        account.nonce = match self.nonce.as_deref() {
            Some(nonce) => parse_u64("nonce", nonce)?,
            None => 0,
        };
        account.receipt_chain_hash = self.receipt_chain_hash.unwrap_or_default();
        account.delegate = self
            .delegate_account
            .map(|d| PublicKey::new(d.public_key))
            .filter(PublicKey::is_valid);
        account.voting_for = self.voting_for.unwrap_or_default();
        Ok(account)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DaemonStatusData {
    pub daemon_status: DaemonStatusNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DaemonStatusNode {
    pub blockchain_length: Option<u64>,
    #[serde(default)]
    pub commit_id: String,
    pub consensus_configuration: ConsensusConfiguration,
    #[serde(default)]
    pub consensus_mechanism: String,
    pub highest_block_length_received: Option<u64>,
    #[serde(default)]
    pub ledger_merkle_root: Option<String>,
    pub num_accounts: Option<u64>,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub state_hash: Option<String>,
    #[serde(default)]
    pub sync_status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConsensusConfiguration {
    pub epoch_duration: u64,
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
}

impl DaemonStatusNode {
    /// Stamp the snapshot with the local observation time.
    pub(crate) fn into_status(self, ts: Timestamp) -> DaemonStatus {
        DaemonStatus {
            ts,
            blockchain_length: self.blockchain_length.unwrap_or(0),
            commit_id: self.commit_id,
            epoch_duration: self.consensus_configuration.epoch_duration,
            slot_duration: self.consensus_configuration.slot_duration,
            slots_per_epoch: self.consensus_configuration.slots_per_epoch,
            consensus_mechanism: self.consensus_mechanism,
            highest_block_length_received: self.highest_block_length_received.unwrap_or(0),
            ledger_merkle_root: self.ledger_merkle_root.unwrap_or_default(),
            num_accounts: self.num_accounts.unwrap_or(0),
            peers_count: self.peers.len() as u32,
            peers: self.peers,
            state_hash: self
                .state_hash
                .filter(|h| !h.trim().is_empty())
                .map(StateHash::new),
            sync_status: self.sync_status,
            uptime_secs: self.uptime_secs,
        }
    }
}
