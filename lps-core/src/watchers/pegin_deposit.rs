//! Watches the BTC deposit addresses of accepted peg-in quotes.
//!
//! On every new Bitcoin block the watcher scans the deposit address of each
//! `WaitingForDeposit` quote, accepts the first deposit that satisfies
//! [`PeginDepositCheck`], and later calls for the user once that deposit has
//! the agreed number of confirmations.

use super::{
    BlockHeight, Clock, StopSignal, Ticker, Watcher, WatcherError, WorkingSet, WorkingSetReader,
    unix_now,
};
use crate::blockchain::BitcoinRpc;
use crate::entities::{PeginQuoteRepository, WatchedPeginQuote};
use crate::events::{Event, EventBus, EventId, EventReceiver};
use crate::usecases::{
    CallForUserUseCase, ExpiredPeginQuoteUseCase, GetWatchedPeginQuotesUseCase,
    UpdatePeginDeposit, UpdatePeginDepositUseCase, WatchedPeginQuotesQuery,
};
use async_trait::async_trait;
use kanau::processor::Processor;
use lps_sdk::objects::{PeginDepositCheck, PeginState, satoshi_to_wei};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NAME: &str = "PeginDepositAddressWatcher";

pub struct PeginDepositAddressWatcher {
    get_watched: GetWatchedPeginQuotesUseCase,
    update_deposit: UpdatePeginDepositUseCase,
    call_for_user: CallForUserUseCase,
    expire: ExpiredPeginQuoteUseCase,
    bitcoin_rpc: Arc<dyn BitcoinRpc>,
    events: EventReceiver,
    ticker: Box<dyn Ticker>,
    quotes: WorkingSet<WatchedPeginQuote>,
    height: BlockHeight,
    clock: Clock,
}

impl PeginDepositAddressWatcher {
    pub fn new(
        repository: Arc<dyn PeginQuoteRepository>,
        call_for_user: CallForUserUseCase,
        bitcoin_rpc: Arc<dyn BitcoinRpc>,
        event_bus: &EventBus,
        ticker: Box<dyn Ticker>,
    ) -> Self {
        Self {
            get_watched: GetWatchedPeginQuotesUseCase::new(repository.clone()),
            update_deposit: UpdatePeginDepositUseCase::new(repository.clone()),
            call_for_user,
            expire: ExpiredPeginQuoteUseCase::new(repository),
            bitcoin_rpc,
            events: event_bus.subscribe(EventId::AcceptedPeginQuote),
            ticker,
            quotes: WorkingSet::new(),
            height: BlockHeight::new(),
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn reader(&self) -> WorkingSetReader<WatchedPeginQuote> {
        self.quotes.reader()
    }

    pub(crate) async fn handle_event(&mut self, event: Event) {
        let id = event.id();
        let Event::AcceptedPeginQuote { watched } = event else {
            warn!(watcher = NAME, event = %id, "Unexpected event, discarding");
            return;
        };
        let quote_hash = watched.quote_hash().to_string();
        if self.quotes.contains(&quote_hash) {
            info!(quote_hash = %quote_hash, "Peg-in quote already watched");
            return;
        }
        if let Err(e) = self
            .bitcoin_rpc
            .import_address(&watched.retained.deposit_address)
            .await
        {
            error!(
                quote_hash = %quote_hash,
                address = %watched.retained.deposit_address,
                error = %e,
                "Failed to import deposit address, quote not watched"
            );
            return;
        }
        info!(quote_hash = %quote_hash, "Watching peg-in deposit address");
        self.quotes.insert(quote_hash, watched);
    }

    pub(crate) async fn on_tick(&mut self) {
        let height = match self.bitcoin_rpc.get_height().await {
            Ok(height) => height,
            Err(e) => {
                error!(watcher = NAME, error = %e, "Failed to get bitcoin height");
                return;
            }
        };
        if !self.height.advance(height) {
            return;
        }
        debug!(watcher = NAME, height, quotes = self.quotes.len(), "New bitcoin block");

        let now = (self.clock)();
        for watched in self.quotes.snapshot() {
            match watched.retained.state {
                PeginState::WaitingForDeposit => self.check_deposit(watched, now).await,
                PeginState::WaitingForDepositConfirmations => {
                    self.check_confirmations(watched).await
                }
                state => {
                    warn!(quote_hash = %watched.quote_hash(), state = %state, "Dropping peg-in quote in unexpected state");
                    self.quotes.remove(watched.quote_hash());
                }
            }
        }
    }

    async fn check_deposit(&mut self, watched: WatchedPeginQuote, now: u64) {
        let quote_hash = watched.quote_hash().to_string();
        let address = watched.retained.deposit_address.clone();
        let transactions = match self.bitcoin_rpc.get_address_transactions(&address).await {
            Ok(transactions) => transactions,
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Failed to scan deposit address");
                return;
            }
        };

        for tx in transactions {
            // Unmined transactions have no block yet.
            let block = match self.bitcoin_rpc.get_transaction_block_info(&tx.hash).await {
                Ok(block) => block,
                Err(e) => {
                    debug!(quote_hash = %quote_hash, tx_hash = %tx.hash, error = %e, "Deposit not mined yet");
                    continue;
                }
            };
            let check = PeginDepositCheck {
                confirmations: tx.confirmations,
                required_confirmations: u64::from(watched.quote.confirmations),
                state: watched.retained.state,
                expired: watched.quote.is_expired_at(block.time),
                amount: satoshi_to_wei(tx.amount_to(&address)),
                total_owed: watched.quote.total(),
            };
            if !check.accepts() {
                debug!(quote_hash = %quote_hash, tx_hash = %tx.hash, "Deposit does not qualify");
                continue;
            }

            let input = UpdatePeginDeposit {
                watched: watched.clone(),
                tx_hash: tx.hash.clone(),
            };
            match self.update_deposit.process(input).await {
                Ok(updated) => {
                    info!(quote_hash = %quote_hash, tx_hash = %tx.hash, "Peg-in deposit accepted");
                    self.quotes.insert(quote_hash, updated);
                }
                Err(e) if e.is_recoverable() => {
                    warn!(quote_hash = %quote_hash, error = %e, "Failed to record deposit, retrying next block");
                }
                Err(e) => {
                    error!(quote_hash = %quote_hash, error = %e, "Failed to record deposit");
                    self.quotes.remove(&quote_hash);
                }
            }
            return;
        }

        if !watched.quote.is_expired_at(now) {
            return;
        }
        match self.expire.process(watched).await {
            Ok(_) => {
                info!(quote_hash = %quote_hash, "Peg-in quote expired without deposit");
                self.quotes.remove(&quote_hash);
            }
            Err(e) if e.is_recoverable() => {
                warn!(quote_hash = %quote_hash, error = %e, "Failed to expire peg-in quote");
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Failed to expire peg-in quote");
                self.quotes.remove(&quote_hash);
            }
        }
    }

    async fn check_confirmations(&mut self, watched: WatchedPeginQuote) {
        let quote_hash = watched.quote_hash().to_string();
        let Some(tx_hash) = watched.retained.user_btc_tx_hash.clone() else {
            error!(quote_hash = %quote_hash, "Peg-in quote has no deposit transaction, dropping");
            self.quotes.remove(&quote_hash);
            return;
        };
        let tx = match self.bitcoin_rpc.get_transaction_info(&tx_hash).await {
            Ok(tx) => tx,
            Err(e) => {
                error!(quote_hash = %quote_hash, tx_hash = %tx_hash, error = %e, "Failed to get deposit transaction");
                return;
            }
        };
        if tx.confirmations < u64::from(watched.quote.confirmations) {
            debug!(
                quote_hash = %quote_hash,
                confirmations = tx.confirmations,
                required = watched.quote.confirmations,
                "Waiting for deposit confirmations"
            );
            return;
        }

        match self.call_for_user.process(watched).await {
            Ok(_) => {
                self.quotes.remove(&quote_hash);
            }
            Err(e) if e.is_recoverable() => {
                warn!(quote_hash = %quote_hash, error = %e, "Call for user failed, retrying next block");
            }
            Err(e) => {
                error!(quote_hash = %quote_hash, error = %e, "Call for user failed");
                self.quotes.remove(&quote_hash);
            }
        }
    }
}

#[async_trait]
impl Watcher for PeginDepositAddressWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn prepare(&mut self) -> Result<(), WatcherError> {
        let quotes = self
            .get_watched
            .process(WatchedPeginQuotesQuery {
                states: vec![
                    PeginState::WaitingForDeposit,
                    PeginState::WaitingForDepositConfirmations,
                ],
            })
            .await?;
        for watched in quotes {
            self.quotes.insert(watched.quote_hash().to_string(), watched);
        }
        info!(watcher = NAME, quotes = self.quotes.len(), "Working set loaded");
        Ok(())
    }

    async fn start(&mut self, mut stop: StopSignal) {
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => {
                    self.ticker.stop();
                    break;
                }
                Some(event) = self.events.recv() => self.handle_event(event).await,
                _ = self.ticker.tick() => self.on_tick().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{BtcBlockInfo, WalletSigner};
    use crate::test_utils::{
        ContractBehaviour, MockBitcoinRpc, MockLiquidityBridge, MockPeginRepository,
        MockRskWallet, PEGIN_DEPOSIT_ADDRESS, PEGIN_TOTAL_SATS, btc_tx, watched_pegin,
    };
    use crate::watchers::{ManualTicker, WatcherHandle};
    use lps_sdk::objects::NodeType;
    use std::sync::atomic::Ordering;

    fn before_expiry() -> u64 {
        1_700_000_500
    }

    fn after_expiry() -> u64 {
        1_700_003_601
    }

    struct Fixture {
        repository: Arc<MockPeginRepository>,
        bitcoin_rpc: Arc<MockBitcoinRpc>,
        contract: Arc<MockLiquidityBridge>,
        event_bus: Arc<EventBus>,
    }

    impl Fixture {
        fn new() -> Self {
            let bitcoin_rpc = Arc::new(MockBitcoinRpc::default());
            bitcoin_rpc.set_height(100);
            Self {
                repository: Arc::new(MockPeginRepository::default()),
                bitcoin_rpc,
                contract: Arc::new(MockLiquidityBridge::default()),
                event_bus: Arc::new(EventBus::new()),
            }
        }

        fn watcher(&self) -> PeginDepositAddressWatcher {
            let call_for_user = CallForUserUseCase::new(
                self.repository.clone(),
                self.contract.clone(),
                self.bitcoin_rpc.clone(),
                Arc::new(MockRskWallet::default()),
                WalletSigner::new(NodeType::Rootstock),
                self.event_bus.clone(),
            );
            let (ticker, _trigger) = ManualTicker::new();
            PeginDepositAddressWatcher::new(
                self.repository.clone(),
                call_for_user,
                self.bitcoin_rpc.clone(),
                &self.event_bus,
                Box::new(ticker),
            )
            .with_clock(before_expiry)
        }

        fn deposit(&self, tx_hash: &str, confirmations: u64, sats: u64) {
            self.bitcoin_rpc.add_transaction(
                Some(PEGIN_DEPOSIT_ADDRESS),
                btc_tx(tx_hash, confirmations, PEGIN_DEPOSIT_ADDRESS, sats),
                Some(BtcBlockInfo {
                    hash: "00aa".to_string(),
                    height: 99,
                    time: 1_700_000_100,
                }),
            );
        }

        async fn accepted(&self, watcher: &mut PeginDepositAddressWatcher, hash: &str) {
            let watched = watched_pegin(hash, PeginState::WaitingForDeposit);
            self.repository.insert(&watched);
            watcher
                .handle_event(Event::AcceptedPeginQuote { watched })
                .await;
        }
    }

    #[tokio::test]
    async fn test_prepare_loads_waiting_quotes() {
        let fixture = Fixture::new();
        for (hash, state) in [
            ("peginHash1", PeginState::WaitingForDeposit),
            ("peginHash2", PeginState::WaitingForDepositConfirmations),
            ("peginHash3", PeginState::CallForUserSucceeded),
        ] {
            fixture.repository.insert(&watched_pegin(hash, state));
        }
        let mut watcher = fixture.watcher();

        watcher.prepare().await.unwrap();

        assert_eq!(watcher.reader().hashes(), vec!["peginHash1", "peginHash2"]);
    }

    #[tokio::test]
    async fn test_prepare_fails_when_repository_is_down() {
        let fixture = Fixture::new();
        fixture.repository.fail_reads.store(true, Ordering::SeqCst);
        let mut watcher = fixture.watcher();

        assert!(watcher.prepare().await.is_err());
    }

    #[tokio::test]
    async fn test_accepted_quote_is_imported_once() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();

        fixture.accepted(&mut watcher, "peginHash1").await;
        fixture.accepted(&mut watcher, "peginHash1").await;

        assert_eq!(watcher.reader().len(), 1);
        assert_eq!(
            *fixture.bitcoin_rpc.imported.lock().unwrap(),
            vec![PEGIN_DEPOSIT_ADDRESS]
        );
    }

    #[tokio::test]
    async fn test_import_failure_leaves_quote_unwatched() {
        let fixture = Fixture::new();
        fixture.bitcoin_rpc.fail_import.store(true, Ordering::SeqCst);
        let mut watcher = fixture.watcher();

        fixture.accepted(&mut watcher, "peginHash1").await;

        assert!(watcher.reader().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_event_is_discarded() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();

        watcher
            .handle_event(Event::CallForUserCompleted {
                watched: watched_pegin("peginHash1", PeginState::CallForUserSucceeded),
                error: None,
            })
            .await;

        assert!(watcher.reader().is_empty());
        assert!(fixture.bitcoin_rpc.imported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_is_accepted_then_called_for_user() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();
        fixture.accepted(&mut watcher, "peginHash1").await;
        fixture.deposit("btcDeposit1", 2, PEGIN_TOTAL_SATS);

        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::WaitingForDepositConfirmations)
        );
        let tracked = watcher.reader().get("peginHash1").unwrap();
        assert_eq!(tracked.retained.user_btc_tx_hash.as_deref(), Some("btcDeposit1"));
        assert!(fixture.contract.calls.lock().unwrap().is_empty());

        fixture.bitcoin_rpc.set_height(101);
        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::CallForUserSucceeded)
        );
        assert_eq!(*fixture.contract.calls.lock().unwrap(), vec!["callForUser"]);
        assert!(watcher.reader().is_empty());
    }

    #[tokio::test]
    async fn test_short_deposit_is_ignored() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();
        fixture.accepted(&mut watcher, "peginHash1").await;
        fixture.deposit("btcDeposit1", 2, PEGIN_TOTAL_SATS - 1);

        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::WaitingForDeposit)
        );
        assert!(watcher.reader().contains("peginHash1"));
    }

    #[tokio::test]
    async fn test_same_height_is_not_processed_twice() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher();
        fixture.accepted(&mut watcher, "peginHash1").await;

        watcher.on_tick().await;
        watcher.on_tick().await;
        fixture.bitcoin_rpc.set_height(90);
        watcher.on_tick().await;

        assert_eq!(fixture.bitcoin_rpc.address_scans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_quote_is_marked_and_dropped() {
        let fixture = Fixture::new();
        let mut watcher = fixture.watcher().with_clock(after_expiry);
        fixture.accepted(&mut watcher, "peginHash1").await;

        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::TimeForDepositElapsed)
        );
        assert!(watcher.reader().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_call_for_user_drops_quote_once() {
        let fixture = Fixture::new();
        fixture.contract.set_behaviour(ContractBehaviour::Reject);
        let mut watcher = fixture.watcher();
        fixture.accepted(&mut watcher, "peginHash1").await;
        fixture.deposit("btcDeposit1", 2, PEGIN_TOTAL_SATS);
        watcher.on_tick().await;

        fixture.bitcoin_rpc.set_height(101);
        watcher.on_tick().await;
        fixture.bitcoin_rpc.set_height(102);
        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::CallForUserFailed)
        );
        assert_eq!(fixture.contract.calls.lock().unwrap().len(), 1);
        assert!(watcher.reader().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_contract_keeps_quote() {
        let fixture = Fixture::new();
        fixture.contract.set_behaviour(ContractBehaviour::Unreachable);
        let mut watcher = fixture.watcher();
        fixture.accepted(&mut watcher, "peginHash1").await;
        fixture.deposit("btcDeposit1", 2, PEGIN_TOTAL_SATS);
        watcher.on_tick().await;

        fixture.bitcoin_rpc.set_height(101);
        watcher.on_tick().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::WaitingForDepositConfirmations)
        );
        assert!(watcher.reader().contains("peginHash1"));
    }

    #[tokio::test]
    async fn test_loop_reacts_to_bus_and_ticks() {
        let fixture = Fixture::new();
        let (ticker, trigger) = ManualTicker::new();
        let call_for_user = CallForUserUseCase::new(
            fixture.repository.clone(),
            fixture.contract.clone(),
            fixture.bitcoin_rpc.clone(),
            Arc::new(MockRskWallet::default()),
            WalletSigner::new(NodeType::Rootstock),
            fixture.event_bus.clone(),
        );
        let watcher = PeginDepositAddressWatcher::new(
            fixture.repository.clone(),
            call_for_user,
            fixture.bitcoin_rpc.clone(),
            &fixture.event_bus,
            Box::new(ticker),
        )
        .with_clock(before_expiry);
        let handle = WatcherHandle::spawn(Box::new(watcher));

        let watched = watched_pegin("peginHash1", PeginState::WaitingForDeposit);
        fixture.repository.insert(&watched);
        fixture.deposit("btcDeposit1", 2, PEGIN_TOTAL_SATS);
        fixture.event_bus.publish(Event::AcceptedPeginQuote { watched });
        trigger.fire().await;

        for _ in 0..100 {
            if fixture.repository.state_of("peginHash1")
                == Some(PeginState::WaitingForDepositConfirmations)
            {
                break;
            }
            tokio::task::yield_now().await;
        }
        handle.shutdown().await;

        assert_eq!(
            fixture.repository.state_of("peginHash1"),
            Some(PeginState::WaitingForDepositConfirmations)
        );
    }
}
