//! Chain ports and their JSON-RPC adapters.
//!
//! Contract bindings ([`LiquidityBridgeContract`], [`BridgeContract`]) are
//! ports only. Every method that broadcasts a transaction takes a
//! [`SigningPermit`], so it cannot be called without holding the wallet lock
//! of that chain.

pub mod bitcoind;
pub mod esplora;
pub mod jsonrpc;
pub mod merkle;
pub mod rootstock;
pub mod signer;

use async_trait::async_trait;
use lps_sdk::objects::{PeginQuote, PegoutDeposit};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

pub use bitcoind::BitcoindClient;
pub use esplora::EsploraBlockSource;
pub use jsonrpc::JsonRpcClient;
pub use merkle::MerkleBranch;
pub use rootstock::RskJsonRpcClient;
pub use signer::{SigningPermit, WalletSigner};

/// Errors returned by chain clients.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

/// Errors returned by contract bindings.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The call never reached the contract. Worth retrying.
    #[error("transport error: {0}")]
    Transport(#[from] RpcError),

    /// The contract refused the call before it was mined.
    #[error("contract rejected the call: {0}")]
    Rejected(String),

    /// The transaction was mined with a failed status.
    #[error("transaction {0} reverted")]
    Reverted(String),
}

impl ContractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContractError::Transport(_))
    }
}

/// Tip of a chain as seen by one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BestBlock {
    pub hash: String,
    pub height: u64,
}

/// A bitcoin transaction as seen by the node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BtcTransactionInfo {
    pub hash: String,
    pub confirmations: u64,
    /// Satoshis paid to each output address.
    pub outputs: HashMap<String, Vec<u64>>,
    pub has_witness: bool,
}

impl BtcTransactionInfo {
    /// Total satoshis this transaction pays to `address`.
    pub fn amount_to(&self, address: &str) -> u64 {
        self.outputs
            .get(address)
            .map_or(0, |amounts| amounts.iter().sum())
    }
}

/// Block that includes a given transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcBlockInfo {
    pub hash: String,
    pub height: u64,
    /// Unix seconds.
    pub time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainInfo {
    pub network: String,
    pub validated_blocks: u64,
    pub best_block_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RskBlock {
    pub number: u64,
    pub hash: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub gas_used: u64,
    pub succeeded: bool,
}

/// Inputs of the peg-in registration on the liquidity bridge contract.
#[derive(Debug, Clone)]
pub struct RegisterPeginParams {
    pub quote: PeginQuote,
    pub signature: String,
    pub raw_btc_tx: Vec<u8>,
    pub partial_merkle_tree: Vec<u8>,
    pub block_height: u64,
}

/// Proof that the provider paid the user, submitted to get refunded.
#[derive(Debug, Clone)]
pub struct RefundPegoutParams {
    pub quote_hash: String,
    pub raw_btc_tx: Vec<u8>,
    pub btc_block_hash: String,
    pub partial_merkle_tree: Vec<u8>,
    pub merkle_branch: MerkleBranch,
}

/// `Penalized` event of the liquidity bridge contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenalizedEvent {
    pub liquidity_provider: String,
    pub penalty: Decimal,
    pub quote_hash: String,
    pub block_number: u64,
}

/// `batch_pegout_created` event of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPegoutCreated {
    pub btc_tx_hash: String,
    pub release_rsk_tx_hashes: Vec<String>,
    pub block_number: u64,
}

#[async_trait]
pub trait BitcoinRpc: Send + Sync {
    async fn get_height(&self) -> Result<u64, RpcError>;

    async fn get_transaction_info(&self, tx_hash: &str) -> Result<BtcTransactionInfo, RpcError>;

    async fn get_transaction_block_info(&self, tx_hash: &str) -> Result<BtcBlockInfo, RpcError>;

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    async fn get_raw_transaction(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError>;

    /// Serialized partial merkle tree proving `tx_hash` in its block.
    async fn get_partial_merkle_tree(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError>;

    async fn get_merkle_branch(&self, tx_hash: &str) -> Result<MerkleBranch, RpcError>;

    /// Start tracking `address` in the node wallet without rescanning.
    async fn import_address(&self, address: &str) -> Result<(), RpcError>;

    async fn get_address_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<BtcTransactionInfo>, RpcError>;
}

#[async_trait]
pub trait RskRpc: Send + Sync {
    async fn get_height(&self) -> Result<u64, RpcError>;

    async fn get_block_by_number(&self, block: BlockTag) -> Result<RskBlock, RpcError>;

    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    /// Balance in wei.
    async fn get_balance(&self, address: &str) -> Result<Decimal, RpcError>;
}

#[async_trait]
pub trait BitcoinWallet: Send + Sync {
    /// Spendable balance in satoshis.
    async fn balance(&self) -> Result<u64, RpcError>;

    async fn send(
        &self,
        permit: &SigningPermit,
        address: &str,
        satoshis: u64,
    ) -> Result<String, RpcError>;

    async fn send_with_op_return(
        &self,
        permit: &SigningPermit,
        address: &str,
        satoshis: u64,
        op_return: &[u8],
    ) -> Result<String, RpcError>;
}

#[async_trait]
pub trait RskWallet: Send + Sync {
    fn address(&self) -> String;

    /// Balance in wei.
    async fn balance(&self) -> Result<Decimal, RpcError>;

    /// Transfers `value` wei and waits for the receipt.
    async fn send_value(
        &self,
        permit: &SigningPermit,
        to: &str,
        value: Decimal,
    ) -> Result<TransactionReceipt, RpcError>;
}

#[async_trait]
pub trait LiquidityBridgeContract: Send + Sync {
    async fn call_for_user(
        &self,
        permit: &SigningPermit,
        quote: &PeginQuote,
    ) -> Result<TransactionReceipt, ContractError>;

    async fn register_pegin(
        &self,
        permit: &SigningPermit,
        params: &RegisterPeginParams,
    ) -> Result<TransactionReceipt, ContractError>;

    async fn refund_pegout(
        &self,
        permit: &SigningPermit,
        params: &RefundPegoutParams,
    ) -> Result<TransactionReceipt, ContractError>;

    /// Deposit events in the inclusive range `[from_block, to_block]`.
    async fn get_pegout_deposits(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PegoutDeposit>, ContractError>;

    async fn get_penalized_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PenalizedEvent>, ContractError>;
}

#[async_trait]
pub trait BridgeContract: Send + Sync {
    fn address(&self) -> String;

    async fn required_tx_confirmations(&self) -> Result<u64, ContractError>;

    /// Minimum peg-out the bridge accepts, in wei.
    async fn minimum_pegout_amount(&self) -> Result<Decimal, ContractError>;

    async fn get_batch_pegout_created_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BatchPegoutCreated>, ContractError>;
}

/// Anything that can report the tip of a chain.
#[async_trait]
pub trait BestBlockSource: Send + Sync {
    fn name(&self) -> String;

    async fn best_block(&self) -> Result<BestBlock, RpcError>;
}
