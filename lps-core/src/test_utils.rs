//! In-memory doubles of every port plus quote fixtures.
//!
//! State lives behind `std::sync::Mutex` with public fields so tests can seed
//! and inspect it directly. Failure switches are `AtomicBool`s.

use crate::alerts::{AlertError, AlertSender};
use crate::blockchain::{
    BatchPegoutCreated, BestBlock, BestBlockSource, BitcoinRpc, BitcoinWallet, BlockTag,
    BlockchainInfo, BridgeContract, BtcBlockInfo, BtcTransactionInfo, ContractError,
    LiquidityBridgeContract, MerkleBranch, PenalizedEvent, RefundPegoutParams,
    RegisterPeginParams, RpcError, RskBlock, RskRpc, RskWallet, SigningPermit, TransactionReceipt,
};
use crate::entities::{
    PeginQuoteRepository, PegoutQuoteRepository, RepositoryError, WatchedPeginQuote,
    WatchedPegoutQuote,
};
use async_trait::async_trait;
use lps_sdk::objects::{
    PeginQuote, PeginState, PegoutDeposit, PegoutQuote, PegoutState, QuoteCreationData,
    RetainedPeginQuote, RetainedPegoutQuote,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

pub const LP_RSK_ADDRESS: &str = "0x9d93929a9099be4355fc2389fbf253982f9df47c";
pub const PEGIN_DEPOSIT_ADDRESS: &str = "2N5muMepJizJE1gR7FbHJU6CD18V3BpNF9p";
pub const PEGOUT_BTC_ADDRESS: &str = "mxqk28jvEtvjxRN8k7W9hFEJfWz5VcUgHW";
pub const BRIDGE_ADDRESS: &str = "0x0000000000000000000000000000000001000006";
/// `pegin_quote().total()` in satoshis.
pub const PEGIN_TOTAL_SATS: u64 = 51_100;

fn unavailable() -> RepositoryError {
    RepositoryError::Unavailable("repository offline".to_string())
}

fn node_down() -> RpcError {
    RpcError::Node {
        code: -28,
        message: "node unavailable".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 50 000 sats of value, 1 000 sats call fee, 100 sats gas fee.
pub fn pegin_quote() -> PeginQuote {
    PeginQuote {
        fed_btc_address: "2N7ZqphnJFZD7C5a1mrnebUbcqBxDSHRgxZ".to_string(),
        lbc_address: "0xc2a630c053d12d63d32b025082f6ba268db18300".to_string(),
        lp_rsk_address: LP_RSK_ADDRESS.to_string(),
        btc_refund_address: "mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8".to_string(),
        rsk_refund_address: "0x79568c2989232dca1840087d73d403602364c0d4".to_string(),
        lp_btc_address: "mnYcQxCZBbmLzNfE9BhV7E8E2u7amdz5y6".to_string(),
        call_fee: Decimal::from(10_000_000_000_000i64),
        penalty_fee: Decimal::from(1_000_000_000_000i64),
        contract_address: "0x79568c2989232dca1840087d73d403602364c0d4".to_string(),
        data: String::new(),
        gas_limit: 21_000,
        nonce: 7,
        value: Decimal::from(500_000_000_000_000i64),
        agreement_timestamp: 1_700_000_000,
        time_for_deposit: 3600,
        lp_call_time: 7200,
        confirmations: 2,
        call_on_register: false,
        gas_fee: Decimal::from(1_000_000_000_000i64),
        product_fee_amount: Decimal::ZERO,
    }
}

/// 60 000 sats of value, paid out to [`PEGOUT_BTC_ADDRESS`].
pub fn pegout_quote() -> PegoutQuote {
    PegoutQuote {
        lbc_address: "0xc2a630c053d12d63d32b025082f6ba268db18300".to_string(),
        lp_rsk_address: LP_RSK_ADDRESS.to_string(),
        btc_refund_address: "mfWxJ45yp2SFn7UciZyNpvDKrzbhyfKrY8".to_string(),
        rsk_refund_address: "0x79568c2989232dca1840087d73d403602364c0d4".to_string(),
        lp_btc_address: "mnYcQxCZBbmLzNfE9BhV7E8E2u7amdz5y6".to_string(),
        call_fee: Decimal::from(10_000_000_000_000i64),
        penalty_fee: Decimal::from(1_000_000_000_000i64),
        nonce: 8,
        deposit_address: PEGOUT_BTC_ADDRESS.to_string(),
        value: Decimal::from(600_000_000_000_000i64),
        agreement_timestamp: 1_700_000_000,
        deposit_date_limit: 3600,
        deposit_confirmations: 10,
        transfer_confirmations: 2,
        transfer_time: 3600,
        expire_date: 1_700_007_200,
        expire_block: 5000,
        gas_fee: Decimal::from(1_000_000_000_000i64),
        product_fee_amount: Decimal::ZERO,
    }
}

pub fn watched_pegin(quote_hash: &str, state: PeginState) -> WatchedPeginQuote {
    let quote = pegin_quote();
    let retained = RetainedPeginQuote {
        quote_hash: quote_hash.to_string(),
        deposit_address: PEGIN_DEPOSIT_ADDRESS.to_string(),
        signature: "0xsig".to_string(),
        required_liquidity: quote.value,
        state,
        user_btc_tx_hash: None,
        call_for_user_tx_hash: None,
        register_pegin_tx_hash: None,
    };
    WatchedPeginQuote::new(quote, retained, None)
}

pub fn watched_pegout(quote_hash: &str, state: PegoutState) -> WatchedPegoutQuote {
    let quote = pegout_quote();
    let retained = RetainedPegoutQuote {
        quote_hash: quote_hash.to_string(),
        deposit_address: quote.lbc_address.clone(),
        signature: "0xsig".to_string(),
        required_liquidity: quote.value,
        state,
        user_rsk_tx_hash: None,
        lp_btc_tx_hash: None,
        refund_pegout_tx_hash: None,
        bridge_refund_tx_hash: None,
        btc_release_tx_hash: None,
    };
    WatchedPegoutQuote::new(quote, retained, None)
}

pub fn creation_data(creation_block: Option<u64>) -> QuoteCreationData {
    QuoteCreationData {
        gas_price: Decimal::from(60_000_000),
        fee_percentage: Decimal::ZERO,
        fixed_fee: Decimal::ZERO,
        creation_block,
    }
}

/// A deposit that exactly covers the quote, well inside its limits.
pub fn pegout_deposit(tx_hash: &str, watched: &WatchedPegoutQuote) -> PegoutDeposit {
    PegoutDeposit {
        tx_hash: tx_hash.to_string(),
        quote_hash: watched.quote_hash().to_string(),
        amount: watched.quote.total(),
        timestamp: watched.quote.agreement_timestamp + 60,
        block_number: 120,
        from: "0x79568c2989232dca1840087d73d403602364c0d4".to_string(),
    }
}

pub fn receipt(tx_hash: &str, block_number: u64, succeeded: bool) -> TransactionReceipt {
    TransactionReceipt {
        tx_hash: tx_hash.to_string(),
        block_number,
        block_hash: format!("0x{block_number:064x}"),
        from: LP_RSK_ADDRESS.to_string(),
        to: None,
        gas_used: 21_000,
        succeeded,
    }
}

pub fn btc_tx(hash: &str, confirmations: u64, address: &str, satoshis: u64) -> BtcTransactionInfo {
    BtcTransactionInfo {
        hash: hash.to_string(),
        confirmations,
        outputs: HashMap::from([(address.to_string(), vec![satoshis])]),
        has_witness: true,
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockPeginRepository {
    pub quotes: Mutex<HashMap<String, PeginQuote>>,
    pub retained: Mutex<HashMap<String, RetainedPeginQuote>>,
    pub creation: Mutex<HashMap<String, QuoteCreationData>>,
    pub updates: Mutex<Vec<RetainedPeginQuote>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_reads: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl MockPeginRepository {
    pub fn insert(&self, watched: &WatchedPeginQuote) {
        let hash = watched.quote_hash().to_string();
        self.quotes
            .lock()
            .unwrap()
            .insert(hash.clone(), watched.quote.clone());
        self.retained
            .lock()
            .unwrap()
            .insert(hash.clone(), watched.retained.clone());
        if let Some(data) = &watched.creation_data {
            self.creation.lock().unwrap().insert(hash, data.clone());
        }
    }

    pub fn state_of(&self, quote_hash: &str) -> Option<PeginState> {
        self.retained
            .lock()
            .unwrap()
            .get(quote_hash)
            .map(|r| r.state)
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl PeginQuoteRepository for MockPeginRepository {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PeginQuote>, RepositoryError> {
        self.check_reads()?;
        Ok(self.quotes.lock().unwrap().get(quote_hash).cloned())
    }

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPeginQuote>, RepositoryError> {
        self.check_reads()?;
        Ok(self.retained.lock().unwrap().get(quote_hash).cloned())
    }

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PeginState],
    ) -> Result<Vec<RetainedPeginQuote>, RepositoryError> {
        self.check_reads()?;
        let mut found: Vec<_> = self
            .retained
            .lock()
            .unwrap()
            .values()
            .filter(|r| states.contains(&r.state))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.quote_hash.cmp(&b.quote_hash));
        Ok(found)
    }

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError> {
        self.check_reads()?;
        Ok(self.creation.lock().unwrap().get(quote_hash).cloned())
    }

    async fn update_retained_quote(
        &self,
        retained: &RetainedPeginQuote,
    ) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.retained
            .lock()
            .unwrap()
            .insert(retained.quote_hash.clone(), retained.clone());
        self.updates.lock().unwrap().push(retained.clone());
        Ok(())
    }

    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut removed = 0;
        for hash in quote_hashes {
            self.retained.lock().unwrap().remove(hash);
            self.creation.lock().unwrap().remove(hash);
            if self.quotes.lock().unwrap().remove(hash).is_some() {
                removed += 1;
            }
            self.deleted.lock().unwrap().push(hash.clone());
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct MockPegoutRepository {
    pub quotes: Mutex<HashMap<String, PegoutQuote>>,
    pub retained: Mutex<HashMap<String, RetainedPegoutQuote>>,
    pub creation: Mutex<HashMap<String, QuoteCreationData>>,
    pub updates: Mutex<Vec<RetainedPegoutQuote>>,
    pub deleted: Mutex<Vec<String>>,
    pub deposits: Mutex<Vec<PegoutDeposit>>,
    pub fail_reads: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_deposit_upserts: AtomicBool,
}

impl MockPegoutRepository {
    pub fn insert(&self, watched: &WatchedPegoutQuote) {
        let hash = watched.quote_hash().to_string();
        self.quotes
            .lock()
            .unwrap()
            .insert(hash.clone(), watched.quote.clone());
        self.retained
            .lock()
            .unwrap()
            .insert(hash.clone(), watched.retained.clone());
        if let Some(data) = &watched.creation_data {
            self.creation.lock().unwrap().insert(hash, data.clone());
        }
    }

    pub fn state_of(&self, quote_hash: &str) -> Option<PegoutState> {
        self.retained
            .lock()
            .unwrap()
            .get(quote_hash)
            .map(|r| r.state)
    }

    fn check_reads(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl PegoutQuoteRepository for MockPegoutRepository {
    async fn get_quote(&self, quote_hash: &str) -> Result<Option<PegoutQuote>, RepositoryError> {
        self.check_reads()?;
        Ok(self.quotes.lock().unwrap().get(quote_hash).cloned())
    }

    async fn get_retained_quote(
        &self,
        quote_hash: &str,
    ) -> Result<Option<RetainedPegoutQuote>, RepositoryError> {
        self.check_reads()?;
        Ok(self.retained.lock().unwrap().get(quote_hash).cloned())
    }

    async fn get_retained_quotes_by_state(
        &self,
        states: &[PegoutState],
    ) -> Result<Vec<RetainedPegoutQuote>, RepositoryError> {
        self.check_reads()?;
        let mut found: Vec<_> = self
            .retained
            .lock()
            .unwrap()
            .values()
            .filter(|r| states.contains(&r.state))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.quote_hash.cmp(&b.quote_hash));
        Ok(found)
    }

    async fn get_creation_data(
        &self,
        quote_hash: &str,
    ) -> Result<Option<QuoteCreationData>, RepositoryError> {
        self.check_reads()?;
        Ok(self.creation.lock().unwrap().get(quote_hash).cloned())
    }

    async fn update_retained_quote(
        &self,
        retained: &RetainedPegoutQuote,
    ) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.retained
            .lock()
            .unwrap()
            .insert(retained.quote_hash.clone(), retained.clone());
        self.updates.lock().unwrap().push(retained.clone());
        Ok(())
    }

    async fn delete_quotes(&self, quote_hashes: &[String]) -> Result<u64, RepositoryError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut removed = 0;
        for hash in quote_hashes {
            self.retained.lock().unwrap().remove(hash);
            self.creation.lock().unwrap().remove(hash);
            if self.quotes.lock().unwrap().remove(hash).is_some() {
                removed += 1;
            }
            self.deleted.lock().unwrap().push(hash.clone());
        }
        Ok(removed)
    }

    async fn upsert_pegout_deposit(&self, deposit: &PegoutDeposit) -> Result<(), RepositoryError> {
        self.upsert_pegout_deposits(std::slice::from_ref(deposit))
            .await
            .map(|_| ())
    }

    async fn upsert_pegout_deposits(
        &self,
        deposits: &[PegoutDeposit],
    ) -> Result<u64, RepositoryError> {
        if self.fail_deposit_upserts.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut stored = self.deposits.lock().unwrap();
        for deposit in deposits {
            stored.retain(|d| d.tx_hash != deposit.tx_hash);
            stored.push(deposit.clone());
        }
        Ok(deposits.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Chain RPC
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockBitcoinRpc {
    pub height: AtomicU64,
    pub height_calls: AtomicUsize,
    pub fail_height: AtomicBool,
    pub transactions: Mutex<HashMap<String, BtcTransactionInfo>>,
    pub blocks: Mutex<HashMap<String, BtcBlockInfo>>,
    /// Address to the hashes of the transactions paying it.
    pub address_transactions: Mutex<HashMap<String, Vec<String>>>,
    pub address_scans: AtomicUsize,
    pub imported: Mutex<Vec<String>>,
    pub fail_import: AtomicBool,
}

impl MockBitcoinRpc {
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn add_transaction(
        &self,
        address: Option<&str>,
        tx: BtcTransactionInfo,
        block: Option<BtcBlockInfo>,
    ) {
        if let Some(address) = address {
            self.address_transactions
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .push(tx.hash.clone());
        }
        if let Some(block) = block {
            self.blocks.lock().unwrap().insert(tx.hash.clone(), block);
        }
        self.transactions
            .lock()
            .unwrap()
            .insert(tx.hash.clone(), tx);
    }

    pub fn set_confirmations(&self, tx_hash: &str, confirmations: u64) {
        if let Some(tx) = self.transactions.lock().unwrap().get_mut(tx_hash) {
            tx.confirmations = confirmations;
        }
    }

    fn known(&self, tx_hash: &str) -> Result<(), RpcError> {
        if self.transactions.lock().unwrap().contains_key(tx_hash) {
            Ok(())
        } else {
            Err(RpcError::NotFound(format!("transaction {tx_hash}")))
        }
    }
}

#[async_trait]
impl BitcoinRpc for MockBitcoinRpc {
    async fn get_height(&self) -> Result<u64, RpcError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(node_down());
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_transaction_info(&self, tx_hash: &str) -> Result<BtcTransactionInfo, RpcError> {
        self.transactions
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("transaction {tx_hash}")))
    }

    async fn get_transaction_block_info(&self, tx_hash: &str) -> Result<BtcBlockInfo, RpcError> {
        self.blocks
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("block of {tx_hash}")))
    }

    async fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        Ok(BlockchainInfo {
            network: "regtest".to_string(),
            validated_blocks: self.height.load(Ordering::SeqCst),
            best_block_hash: "00ff".to_string(),
        })
    }

    async fn get_raw_transaction(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError> {
        self.known(tx_hash)?;
        Ok(vec![0x02, 0x00, 0x00, 0x00])
    }

    async fn get_partial_merkle_tree(&self, tx_hash: &str) -> Result<Vec<u8>, RpcError> {
        self.known(tx_hash)?;
        Ok(vec![0x01, 0x00, 0x00, 0x00])
    }

    async fn get_merkle_branch(&self, tx_hash: &str) -> Result<MerkleBranch, RpcError> {
        self.known(tx_hash)?;
        Ok(MerkleBranch {
            hashes: Vec::new(),
            path: 0,
        })
    }

    async fn import_address(&self, address: &str) -> Result<(), RpcError> {
        if self.fail_import.load(Ordering::SeqCst) {
            return Err(RpcError::Node {
                code: -4,
                message: "wallet is locked".to_string(),
            });
        }
        self.imported.lock().unwrap().push(address.to_string());
        Ok(())
    }

    async fn get_address_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<BtcTransactionInfo>, RpcError> {
        self.address_scans.fetch_add(1, Ordering::SeqCst);
        let hashes = self
            .address_transactions
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default();
        let transactions = self.transactions.lock().unwrap();
        Ok(hashes
            .iter()
            .filter_map(|h| transactions.get(h).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct MockRskRpc {
    pub height: AtomicU64,
    pub height_calls: AtomicUsize,
    pub fail_height: AtomicBool,
    pub receipts: Mutex<HashMap<String, TransactionReceipt>>,
    pub balances: Mutex<HashMap<String, Decimal>>,
}

impl MockRskRpc {
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }
}

#[async_trait]
impl RskRpc for MockRskRpc {
    async fn get_height(&self) -> Result<u64, RpcError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(node_down());
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_block_by_number(&self, block: BlockTag) -> Result<RskBlock, RpcError> {
        let number = match block {
            BlockTag::Latest => self.height.load(Ordering::SeqCst),
            BlockTag::Number(n) => n,
        };
        Ok(RskBlock {
            number,
            hash: format!("0x{number:064x}"),
            timestamp: 1_700_000_000 + number * 30,
        })
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, RpcError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Wallets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcPayment {
    pub address: String,
    pub satoshis: u64,
    pub op_return: Option<Vec<u8>>,
}

/// Starts with one BTC.
pub struct MockBitcoinWallet {
    pub balance: AtomicU64,
    pub sends: Mutex<Vec<BtcPayment>>,
    pub fail_sends: AtomicBool,
    pub fail_balance: AtomicBool,
}

impl Default for MockBitcoinWallet {
    fn default() -> Self {
        Self {
            balance: AtomicU64::new(100_000_000),
            sends: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_balance: AtomicBool::new(false),
        }
    }
}

impl MockBitcoinWallet {
    fn record(&self, payment: BtcPayment) -> Result<String, RpcError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RpcError::Node {
                code: -6,
                message: "Insufficient funds".to_string(),
            });
        }
        let _ = self
            .balance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| {
                Some(b.saturating_sub(payment.satoshis))
            });
        let mut sends = self.sends.lock().unwrap();
        sends.push(payment);
        Ok(format!("btcTx{}", sends.len()))
    }
}

#[async_trait]
impl BitcoinWallet for MockBitcoinWallet {
    async fn balance(&self) -> Result<u64, RpcError> {
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(node_down());
        }
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn send(
        &self,
        _permit: &SigningPermit,
        address: &str,
        satoshis: u64,
    ) -> Result<String, RpcError> {
        self.record(BtcPayment {
            address: address.to_string(),
            satoshis,
            op_return: None,
        })
    }

    async fn send_with_op_return(
        &self,
        _permit: &SigningPermit,
        address: &str,
        satoshis: u64,
        op_return: &[u8],
    ) -> Result<String, RpcError> {
        self.record(BtcPayment {
            address: address.to_string(),
            satoshis,
            op_return: Some(op_return.to_vec()),
        })
    }
}

/// Starts with ten RBTC.
pub struct MockRskWallet {
    pub address: String,
    pub balance: Mutex<Decimal>,
    pub sends: Mutex<Vec<(String, Decimal)>>,
    pub fail_sends: AtomicBool,
    pub revert_sends: AtomicBool,
    pub fail_balance: AtomicBool,
}

impl Default for MockRskWallet {
    fn default() -> Self {
        Self {
            address: LP_RSK_ADDRESS.to_string(),
            balance: Mutex::new(Decimal::from(10_000_000_000_000_000_000u64)),
            sends: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            revert_sends: AtomicBool::new(false),
            fail_balance: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RskWallet for MockRskWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<Decimal, RpcError> {
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(node_down());
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn send_value(
        &self,
        _permit: &SigningPermit,
        to: &str,
        value: Decimal,
    ) -> Result<TransactionReceipt, RpcError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(node_down());
        }
        let mut sends = self.sends.lock().unwrap();
        sends.push((to.to_string(), value));
        let tx_hash = format!("0xrsk{}", sends.len());
        Ok(receipt(&tx_hash, 100, !self.revert_sends.load(Ordering::SeqCst)))
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContractBehaviour {
    #[default]
    Succeed,
    /// Mined with a failed status.
    Revert,
    Reject,
    Unreachable,
}

#[derive(Default)]
pub struct MockLiquidityBridge {
    pub behaviour: Mutex<ContractBehaviour>,
    /// Contract method names, in call order.
    pub calls: Mutex<Vec<&'static str>>,
    pub deposits: Mutex<Vec<PegoutDeposit>>,
    pub penalized: Mutex<Vec<PenalizedEvent>>,
    pub queried_ranges: Mutex<Vec<(u64, u64)>>,
    pub penalized_ranges: Mutex<Vec<(u64, u64)>>,
    pub fail_queries: AtomicBool,
}

impl MockLiquidityBridge {
    pub fn set_behaviour(&self, behaviour: ContractBehaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    fn submit(&self, method: &'static str) -> Result<TransactionReceipt, ContractError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(method);
        let tx_hash = format!("0x{method}{}", calls.len());
        match *self.behaviour.lock().unwrap() {
            ContractBehaviour::Succeed => Ok(receipt(&tx_hash, 100, true)),
            ContractBehaviour::Revert => Ok(receipt(&tx_hash, 100, false)),
            ContractBehaviour::Reject => Err(ContractError::Rejected("LBC001".to_string())),
            ContractBehaviour::Unreachable => Err(ContractError::Transport(node_down())),
        }
    }

    fn check_queries(&self) -> Result<(), ContractError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ContractError::Transport(node_down()));
        }
        Ok(())
    }
}

#[async_trait]
impl LiquidityBridgeContract for MockLiquidityBridge {
    async fn call_for_user(
        &self,
        _permit: &SigningPermit,
        _quote: &PeginQuote,
    ) -> Result<TransactionReceipt, ContractError> {
        self.submit("callForUser")
    }

    async fn register_pegin(
        &self,
        _permit: &SigningPermit,
        _params: &RegisterPeginParams,
    ) -> Result<TransactionReceipt, ContractError> {
        self.submit("registerPegin")
    }

    async fn refund_pegout(
        &self,
        _permit: &SigningPermit,
        _params: &RefundPegoutParams,
    ) -> Result<TransactionReceipt, ContractError> {
        self.submit("refundPegout")
    }

    async fn get_pegout_deposits(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PegoutDeposit>, ContractError> {
        self.queried_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));
        self.check_queries()?;
        Ok(self
            .deposits
            .lock()
            .unwrap()
            .iter()
            .filter(|d| (from_block..=to_block).contains(&d.block_number))
            .cloned()
            .collect())
    }

    async fn get_penalized_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PenalizedEvent>, ContractError> {
        self.penalized_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));
        self.check_queries()?;
        Ok(self
            .penalized
            .lock()
            .unwrap()
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }
}

/// Requires ten confirmations and accepts any amount by default.
pub struct MockBridge {
    pub address: String,
    pub required_confirmations: AtomicU64,
    pub minimum: Mutex<Decimal>,
    pub events: Mutex<Vec<BatchPegoutCreated>>,
    pub queried_ranges: Mutex<Vec<(u64, u64)>>,
    pub fail_queries: AtomicBool,
    pub fail_confirmations: AtomicBool,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self {
            address: BRIDGE_ADDRESS.to_string(),
            required_confirmations: AtomicU64::new(10),
            minimum: Mutex::new(Decimal::ZERO),
            events: Mutex::new(Vec::new()),
            queried_ranges: Mutex::new(Vec::new()),
            fail_queries: AtomicBool::new(false),
            fail_confirmations: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BridgeContract for MockBridge {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn required_tx_confirmations(&self) -> Result<u64, ContractError> {
        if self.fail_confirmations.load(Ordering::SeqCst) {
            return Err(ContractError::Transport(node_down()));
        }
        Ok(self.required_confirmations.load(Ordering::SeqCst))
    }

    async fn minimum_pegout_amount(&self) -> Result<Decimal, ContractError> {
        Ok(*self.minimum.lock().unwrap())
    }

    async fn get_batch_pegout_created_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<BatchPegoutCreated>, ContractError> {
        self.queried_ranges
            .lock()
            .unwrap()
            .push((from_block, to_block));
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(ContractError::Transport(node_down()));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Block sources and alerts
// ---------------------------------------------------------------------------

/// Replays scripted tips. The last response repeats forever; `None` is an error.
pub struct MockBlockSource {
    pub name: String,
    pub responses: Mutex<VecDeque<Option<BestBlock>>>,
    pub calls: AtomicUsize,
}

impl MockBlockSource {
    pub fn new(name: &str, response: Option<BestBlock>) -> Self {
        Self::sequence(name, [response])
    }

    pub fn sequence(name: &str, responses: impl IntoIterator<Item = Option<BestBlock>>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BestBlockSource for MockBlockSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn best_block(&self) -> Result<BestBlock, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().flatten()
        } else {
            responses.front().cloned().flatten()
        };
        response.ok_or_else(node_down)
    }
}

#[derive(Default)]
pub struct MockAlertSender {
    /// `(subject, body)` of every delivered alert.
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl AlertSender for MockAlertSender {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        _recipients: &[String],
    ) -> Result<(), AlertError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AlertError::DeliveryFailed {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
