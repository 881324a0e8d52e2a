//! Bootstrap: wiring the watchers, running them and shutting them down.

use crate::alerts::{AlertSender, LogAlertSender, WebhookAlertSender};
use crate::blockchain::{
    BestBlockSource, BitcoinRpc, BitcoinWallet, BitcoindClient, BridgeContract,
    EsploraBlockSource, LiquidityBridgeContract, RskJsonRpcClient, RskRpc, RskWallet,
    WalletSigner,
};
use crate::config::RuntimeConfig;
use crate::entities::{PeginQuoteRepository, PegoutQuoteRepository};
use crate::events::EventBus;
use crate::framework::DatabaseProcessor;
use crate::usecases::{
    BridgePegoutUseCase, BtcReleaseUseCase, CallForUserUseCase, CheckLiquidityUseCase,
    CleanExpiredQuotesUseCase, ColdWalletSettings, ColdWalletTransferUseCase,
    EclipseCheckSettings, EclipseCheckUseCase, PenalizationAlertUseCase, RefundPegoutUseCase,
    RegisterPeginUseCase, SendPegoutUseCase,
};
use crate::watchers::pegout_rsk_deposit::DepositCacheSettings;
use crate::watchers::{
    BtcReleaseWatcher, ColdWalletWatcher, EclipseTarget, EclipseWatcher, IntervalTicker,
    LiquidityCheckWatcher, PeginBridgeWatcher, PeginDepositAddressWatcher, PegoutBridgeWatcher,
    PegoutBtcTransferWatcher, PegoutRskDepositWatcher, PenalizationWatcher, QuoteCleanerWatcher,
    Watcher, WatcherHandle,
};
use anyhow::Context;
use lps_sdk::config::EclipseTargetConfig;
use lps_sdk::objects::NodeType;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Every external dependency of the watchers.
#[derive(Clone)]
pub struct Ports {
    pub pegin_repository: Arc<dyn PeginQuoteRepository>,
    pub pegout_repository: Arc<dyn PegoutQuoteRepository>,
    pub bitcoin_rpc: Arc<dyn BitcoinRpc>,
    pub bitcoin_wallet: Arc<dyn BitcoinWallet>,
    pub rsk_rpc: Arc<dyn RskRpc>,
    pub rsk_wallet: Arc<dyn RskWallet>,
    pub liquidity_bridge: Arc<dyn LiquidityBridgeContract>,
    pub bridge: Arc<dyn BridgeContract>,
    pub bitcoin_node: Arc<dyn BestBlockSource>,
    pub rsk_node: Arc<dyn BestBlockSource>,
    pub alert_sender: Arc<dyn AlertSender>,
}

impl Ports {
    /// Builds the node and database adapters from the configuration. Contract
    /// bindings are supplied by the caller.
    pub fn connect(
        config: &RuntimeConfig,
        database: DatabaseProcessor,
        liquidity_bridge: Arc<dyn LiquidityBridgeContract>,
        bridge: Arc<dyn BridgeContract>,
    ) -> anyhow::Result<Self> {
        let database = Arc::new(database);
        let bitcoind = Arc::new(
            BitcoindClient::new(
                config.bitcoin.rpc_url.clone(),
                &config.bitcoin.rpc_user,
                &config.bitcoin.rpc_password,
                config.bitcoin.wallet.as_deref(),
            )
            .context("invalid bitcoin wallet url")?,
        );
        let rskj = Arc::new(RskJsonRpcClient::new(
            config.rootstock.rpc_url.clone(),
            config.rootstock.lp_address.clone(),
        ));
        let alert_sender: Arc<dyn AlertSender> = match &config.alerts.webhook_url {
            Some(url) => Arc::new(WebhookAlertSender::new(url.clone())),
            None => {
                info!("No alert webhook configured, alerts are only logged");
                Arc::new(LogAlertSender)
            }
        };

        Ok(Self {
            pegin_repository: database.clone(),
            pegout_repository: database,
            bitcoin_rpc: bitcoind.clone(),
            bitcoin_wallet: bitcoind.clone(),
            rsk_rpc: rskj.clone(),
            rsk_wallet: rskj.clone(),
            liquidity_bridge,
            bridge,
            bitcoin_node: bitcoind,
            rsk_node: rskj,
            alert_sender,
        })
    }
}

/// Watchers in start order.
#[derive(Default)]
pub struct WatcherSet {
    watchers: Vec<Box<dyn Watcher>>,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, watcher: impl Watcher + 'static) {
        self.watchers.push(Box::new(watcher));
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.watchers.iter().map(|w| w.name()).collect()
    }

    /// Prepares every watcher in order and stops at the first failure.
    pub async fn prepare_all(&mut self) -> anyhow::Result<()> {
        for watcher in &mut self.watchers {
            let name = watcher.name();
            watcher
                .prepare()
                .await
                .with_context(|| format!("failed to prepare {name}"))?;
            info!(watcher = name, "Watcher prepared");
        }
        Ok(())
    }

    pub fn start_all(self) -> Vec<WatcherHandle> {
        self.watchers.into_iter().map(WatcherHandle::spawn).collect()
    }
}

/// Stops the watchers in reverse start order.
pub async fn shutdown_all(handles: &[WatcherHandle]) {
    for handle in handles.iter().rev() {
        handle.shutdown().await;
    }
    info!(watchers = handles.len(), "All watchers stopped");
}

/// Completes when SIGTERM or SIGINT is received.
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Prepares and starts `watchers`, then shuts them down once `shutdown`
/// completes.
pub async fn run_until(
    mut watchers: WatcherSet,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    watchers.prepare_all().await?;
    let handles = watchers.start_all();
    info!(watchers = handles.len(), "Watchers running");
    shutdown.await;
    shutdown_all(&handles).await;
    Ok(())
}

pub async fn run_until_signal(watchers: WatcherSet) -> anyhow::Result<()> {
    let mut signal = Ok(());
    run_until(watchers, async { signal = shutdown_signal().await }).await?;
    signal.context("failed to install signal handlers")
}

fn ticker(period: Duration) -> Box<IntervalTicker> {
    Box::new(IntervalTicker::new(period))
}

fn eclipse_target(
    node_type: NodeType,
    config: &EclipseTargetConfig,
    main_source: Arc<dyn BestBlockSource>,
    event_bus: &Arc<EventBus>,
    ports: &Ports,
    recipients: &[String],
) -> EclipseTarget {
    let sources = config
        .sources
        .iter()
        .map(|url| -> Arc<dyn BestBlockSource> {
            match node_type {
                NodeType::Bitcoin => Arc::new(EsploraBlockSource::new(url.clone())),
                NodeType::Rootstock => Arc::new(RskJsonRpcClient::observer(url.clone())),
            }
        })
        .collect();
    let check = EclipseCheckUseCase::new(
        node_type,
        main_source,
        sources,
        EclipseCheckSettings::from(config),
        event_bus.clone(),
        ports.alert_sender.clone(),
        recipients.to_vec(),
    );
    EclipseTarget::new(Arc::new(check), Duration::from_secs(config.cooldown_secs))
}

/// Wires every watcher enabled by `config` against `ports`.
///
/// The cold wallet watcher needs a `[cold_wallet]` section and the eclipse
/// watcher at least one enabled target.
pub fn build_watchers(config: &RuntimeConfig, ports: &Ports, event_bus: &Arc<EventBus>) -> WatcherSet {
    let schedule = &config.schedule;
    let recipients = &config.alerts.recipients;
    let btc_signer = WalletSigner::new(NodeType::Bitcoin);
    let rsk_signer = WalletSigner::new(NodeType::Rootstock);
    let mut watchers = WatcherSet::new();

    watchers.push(PeginDepositAddressWatcher::new(
        ports.pegin_repository.clone(),
        CallForUserUseCase::new(
            ports.pegin_repository.clone(),
            ports.liquidity_bridge.clone(),
            ports.bitcoin_rpc.clone(),
            ports.rsk_wallet.clone(),
            rsk_signer.clone(),
            event_bus.clone(),
        ),
        ports.bitcoin_rpc.clone(),
        event_bus,
        ticker(schedule.pegin_deposit),
    ));
    watchers.push(PeginBridgeWatcher::new(
        ports.pegin_repository.clone(),
        RegisterPeginUseCase::new(
            ports.pegin_repository.clone(),
            ports.liquidity_bridge.clone(),
            ports.bitcoin_rpc.clone(),
            rsk_signer.clone(),
            event_bus.clone(),
        ),
        ports.bitcoin_rpc.clone(),
        ports.bridge.clone(),
        event_bus,
        ticker(schedule.pegin_bridge),
    ));
    watchers.push(PegoutRskDepositWatcher::new(
        ports.pegout_repository.clone(),
        SendPegoutUseCase::new(
            ports.pegout_repository.clone(),
            ports.rsk_rpc.clone(),
            ports.bitcoin_wallet.clone(),
            btc_signer.clone(),
            event_bus.clone(),
        ),
        ports.liquidity_bridge.clone(),
        ports.rsk_rpc.clone(),
        event_bus,
        DepositCacheSettings {
            start_block: config.pegout.deposit_cache_start_block,
            page_size: config.pegout.deposit_cache_page_size,
        },
        ticker(schedule.pegout_rsk_deposit),
    ));
    watchers.push(PegoutBtcTransferWatcher::new(
        ports.pegout_repository.clone(),
        RefundPegoutUseCase::new(
            ports.pegout_repository.clone(),
            ports.liquidity_bridge.clone(),
            ports.bitcoin_rpc.clone(),
            rsk_signer.clone(),
            event_bus.clone(),
        ),
        ports.bitcoin_rpc.clone(),
        event_bus,
        ticker(schedule.pegout_btc_transfer),
    ));
    watchers.push(PegoutBridgeWatcher::new(
        BridgePegoutUseCase::new(
            ports.pegout_repository.clone(),
            ports.bridge.clone(),
            ports.rsk_wallet.clone(),
            rsk_signer.clone(),
        ),
        ticker(schedule.pegout_bridge),
    ));
    watchers.push(BtcReleaseWatcher::new(
        BtcReleaseUseCase::new(ports.pegout_repository.clone(), ports.bridge.clone()),
        ports.rsk_rpc.clone(),
        config.pegout.btc_release_start_block,
        config.pegout.btc_release_page_size,
        ticker(schedule.btc_release),
    ));
    watchers.push(PenalizationWatcher::new(
        PenalizationAlertUseCase::new(
            ports.liquidity_bridge.clone(),
            ports.alert_sender.clone(),
            recipients.clone(),
            config.rootstock.lp_address.clone(),
        ),
        ports.rsk_rpc.clone(),
        ticker(schedule.penalization),
    ));
    watchers.push(LiquidityCheckWatcher::new(
        CheckLiquidityUseCase::new(
            ports.rsk_wallet.clone(),
            ports.bitcoin_wallet.clone(),
            ports.alert_sender.clone(),
            recipients.clone(),
            config.liquidity.min_pegin_liquidity,
            config.liquidity.min_pegout_liquidity,
        ),
        config.liquidity_timeout,
        ticker(schedule.liquidity_check),
    ));
    if let Some(cold_wallet) = &config.cold_wallet {
        watchers.push(ColdWalletWatcher::new(
            ColdWalletTransferUseCase::new(
                ports.bitcoin_wallet.clone(),
                ports.rsk_wallet.clone(),
                btc_signer.clone(),
                rsk_signer.clone(),
                ColdWalletSettings::from(cold_wallet),
            ),
            config.cold_wallet_timeout,
            ticker(schedule.cold_wallet),
        ));
    }
    watchers.push(QuoteCleanerWatcher::new(
        CleanExpiredQuotesUseCase::new(
            ports.pegin_repository.clone(),
            ports.pegout_repository.clone(),
        ),
        ticker(schedule.quote_cleaner),
    ));

    let mut targets = Vec::new();
    for (node_type, target, main_source) in [
        (NodeType::Bitcoin, &config.eclipse.bitcoin, &ports.bitcoin_node),
        (NodeType::Rootstock, &config.eclipse.rootstock, &ports.rsk_node),
    ] {
        if target.enabled {
            targets.push(eclipse_target(
                node_type,
                target,
                main_source.clone(),
                event_bus,
                ports,
                recipients,
            ));
        }
    }
    if !targets.is_empty() {
        watchers.push(EclipseWatcher::new(targets, ticker(schedule.eclipse_check)));
    }

    watchers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::RpcError;
    use crate::config::ConfigLoader;
    use crate::events::EventId;
    use crate::test_utils::{
        MockAlertSender, MockBitcoinRpc, MockBitcoinWallet, MockBlockSource, MockBridge,
        MockLiquidityBridge, MockPeginRepository, MockPegoutRepository, MockRskRpc, MockRskWallet,
    };
    use crate::watchers::{StopSignal, WatcherError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const CONFIG: &str = r#"
[bitcoin]
rpc_url = "http://127.0.0.1:18443"
rpc_user = "lps"
rpc_password = "secret"

[rootstock]
rpc_url = "http://127.0.0.1:4444"
lp_address = "0x9d93929a9099be4355fc2389fbf253982f9df47c"
"#;

    fn mock_ports() -> Ports {
        Ports {
            pegin_repository: Arc::new(MockPeginRepository::default()),
            pegout_repository: Arc::new(MockPegoutRepository::default()),
            bitcoin_rpc: Arc::new(MockBitcoinRpc::default()),
            bitcoin_wallet: Arc::new(MockBitcoinWallet::default()),
            rsk_rpc: Arc::new(MockRskRpc::default()),
            rsk_wallet: Arc::new(MockRskWallet::default()),
            liquidity_bridge: Arc::new(MockLiquidityBridge::default()),
            bridge: Arc::new(MockBridge::default()),
            bitcoin_node: Arc::new(MockBlockSource::new("bitcoind", None)),
            rsk_node: Arc::new(MockBlockSource::new("rskj", None)),
            alert_sender: Arc::new(MockAlertSender::default()),
        }
    }

    type Journal = Arc<Mutex<Vec<String>>>;

    struct RecordingWatcher {
        name: &'static str,
        fail_prepare: bool,
        journal: Journal,
    }

    impl RecordingWatcher {
        fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                fail_prepare: false,
                journal: journal.clone(),
            }
        }

        fn failing(name: &'static str, journal: &Journal) -> Self {
            Self {
                fail_prepare: true,
                ..Self::new(name, journal)
            }
        }
    }

    #[async_trait]
    impl Watcher for RecordingWatcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn prepare(&mut self) -> Result<(), WatcherError> {
            self.journal.lock().unwrap().push(format!("prepare {}", self.name));
            if self.fail_prepare {
                return Err(RpcError::NotFound("best block".to_string()).into());
            }
            Ok(())
        }

        async fn start(&mut self, mut stop: StopSignal) {
            stop.stopped().await;
            self.journal.lock().unwrap().push(format!("stop {}", self.name));
        }
    }

    #[tokio::test]
    async fn test_prepare_all_stops_at_first_failure() {
        let journal = Journal::default();
        let mut watchers = WatcherSet::new();
        watchers.push(RecordingWatcher::new("first", &journal));
        watchers.push(RecordingWatcher::failing("second", &journal));
        watchers.push(RecordingWatcher::new("third", &journal));

        let err = watchers.prepare_all().await.unwrap_err();

        assert_eq!(err.to_string(), "failed to prepare second");
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["prepare first", "prepare second"]
        );
    }

    #[tokio::test]
    async fn test_watchers_stop_in_reverse_order() {
        let journal = Journal::default();
        let mut watchers = WatcherSet::new();
        watchers.push(RecordingWatcher::new("first", &journal));
        watchers.push(RecordingWatcher::new("second", &journal));
        watchers.push(RecordingWatcher::new("third", &journal));

        run_until(watchers, async {}).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "prepare first",
                "prepare second",
                "prepare third",
                "stop third",
                "stop second",
                "stop first",
            ]
        );
    }

    #[tokio::test]
    async fn test_default_config_wires_core_watchers() {
        let config = ConfigLoader::parse(CONFIG).unwrap();
        let bus = Arc::new(EventBus::new());

        let watchers = build_watchers(&config, &mock_ports(), &bus);

        assert_eq!(
            watchers.names(),
            vec![
                "PeginDepositAddressWatcher",
                "PeginBridgeWatcher",
                "PegoutRskDepositWatcher",
                "PegoutBtcTransferWatcher",
                "PegoutBridgeWatcher",
                "BtcReleaseWatcher",
                "PenalizationAlertWatcher",
                "LiquidityCheckWatcher",
                "QuoteCleanerWatcher",
            ]
        );
        assert_eq!(bus.subscriber_count(EventId::AcceptedPeginQuote), 1);
        assert_eq!(bus.subscriber_count(EventId::AcceptedPegoutQuote), 1);
    }

    #[tokio::test]
    async fn test_optional_watchers_follow_config() {
        let config = ConfigLoader::parse(&format!(
            r#"{CONFIG}
[cold_wallet]
btc_address = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh"
rsk_address = "0x79568c2989232dca1840087d73d403602364c0d4"
btc_hot_threshold = 100000000
rsk_hot_threshold = "2000000000000000000"

[eclipse.rootstock]
enabled = true
sources = ["https://public-node.rsk.co"]
"#
        ))
        .unwrap();
        let bus = Arc::new(EventBus::new());

        let watchers = build_watchers(&config, &mock_ports(), &bus);

        let names = watchers.names();
        assert_eq!(watchers.len(), 11);
        assert!(names.contains(&"ColdWalletWatcher"));
        assert_eq!(names.last(), Some(&"EclipseWatcher"));
    }
}
