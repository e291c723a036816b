//! GraphQL documents sent to the daemon.

/// Selection set shared by every block query.
const BLOCK_FIELDS: &str = r#"
    stateHash
    protocolState {
      previousStateHash
      consensusState { blockchainLength epoch slot totalCurrency }
      blockchainState { snarkedLedgerHash stagedLedgerHash date }
    }
    transactions {
      coinbase
      feeTransfer { fee recipient }
      userCommands { id from to memo fee amount nonce isDelegation }
    }
    snarkJobs { fee prover workIds }
    creatorAccount { publicKey }
"#;

pub(crate) fn recent_blocks() -> String {
    format!("query RecentBlocks($last: Int!) {{ blocks(last: $last) {{ nodes {{{BLOCK_FIELDS}}} }} }}")
}

pub(crate) fn block() -> String {
    format!("query Block($stateHash: String!) {{ block(stateHash: $stateHash) {{{BLOCK_FIELDS}}} }}")
}

pub(crate) const ACCOUNT: &str = r#"
query Account($publicKey: PublicKey!) {
  account(publicKey: $publicKey) {
    balance { total }
    nonce
    receiptChainHash
    delegateAccount { publicKey }
    votingFor
  }
}
"#;

pub(crate) const DAEMON_STATUS: &str = r#"
query DaemonStatus {
  daemonStatus {
    blockchainLength
    commitId
    consensusConfiguration { epochDuration slotDuration slotsPerEpoch }
    consensusMechanism
    highestBlockLengthReceived
    ledgerMerkleRoot
    numAccounts
    peers
    stateHash
    syncStatus
    uptimeSecs
  }
}
"#;

pub(crate) const NEW_BLOCK_SUBSCRIPTION: &str = "subscription { newBlock { stateHash } }";
