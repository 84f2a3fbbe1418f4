//! Casino facade: owns the tables and routes client calls to them.

use crate::auto_action::{AutoActionEngine, AutoRule};
use crate::config::{validate_table, ConfigLoader, EngineConfig, SettlementConfig, TableConfig};
use crate::errors::{BetError, ConfigurationError, EngineError, EngineResult, RoundError, WalletError};
use crate::games::outcome::{OutcomeGenerator, StandardOutcomes};
use crate::games::types::{Bet, GameType, HistoryEntry, Multiplier, Slot, TableId, UserId};
use crate::games::vrf_engine::VRFGameEngine;
use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::ledger::{BetLedger, BetRequest};
use crate::metrics::EngineMetrics;
use crate::scheduler::{PhaseClock, RoundSnapshot, TableCommand, TableContext, TableEvent, TableRunner, EVENT_CAPACITY};
use crate::settlement::SettlementEngine;
use crate::wallet::{InMemoryWallet, Wallet};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// Client-side handle to one running table
pub struct TableHandle {
    ctx: Arc<TableContext>,
    commands: mpsc::Sender<TableCommand>,
    snapshot: watch::Receiver<RoundSnapshot>,
}

impl TableHandle {
    pub fn id(&self) -> &TableId {
        &self.ctx.config.id
    }

    pub fn config(&self) -> &TableConfig {
        &self.ctx.config
    }

    /// Current round, phase and live multiplier
    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change
    pub fn watch(&self) -> watch::Receiver<RoundSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TableEvent> {
        self.ctx.events.subscribe()
    }

    /// Table events as a `Stream`. Lagging consumers see a `Lagged` error item.
    pub fn events(&self) -> BroadcastStream<TableEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Submit a bet to the round currently taking bets
    pub async fn place_bet(&self, request: BetRequest) -> Result<Bet, BetError> {
        let round = self.snapshot().round;
        if !PhaseClock::accepts_bets(round.phase) {
            return Err(BetError::RoundClosed(round.id));
        }
        let bet = self.ctx.ledger.submit(&round.id, request.clone()).await?;
        if self.ctx.config.game_type.is_continuous() {
            self.ctx.auto.remember_bet(&request);
        }
        Ok(bet)
    }

    /// Cash out a crash bet at the live multiplier
    pub async fn cash_out(&self, user_id: &UserId, slot: Slot) -> Result<Bet, RoundError> {
        let snapshot = self.snapshot();
        let multiplier = snapshot.live_multiplier.ok_or_else(|| RoundError::CashOutRejected {
            multiplier: Multiplier::ZERO,
            reason: format!("no flight in progress ({})", snapshot.round.phase),
        })?;

        let bet = self
            .ctx
            .ledger
            .cash_out(&snapshot.round.id, user_id, slot, multiplier)
            .await?;
        self.ctx.emit(TableEvent::CashedOut {
            round_id: bet.round_id.clone(),
            user_id: bet.user_id.clone(),
            slot,
            multiplier,
            automatic: false,
        });
        Ok(bet)
    }

    pub fn register_auto_action(&self, user_id: UserId, slot: Slot, rule: AutoRule) -> Result<(), BetError> {
        let game = self.ctx.config.game_type;
        if !game.is_continuous() {
            return Err(BetError::InvalidBet {
                game,
                reason: "auto actions need a crash table".to_string(),
            });
        }
        if slot >= self.ctx.config.max_slots {
            return Err(BetError::InvalidBet {
                game,
                reason: format!("slot {} exceeds table limit {}", slot, self.ctx.config.max_slots),
            });
        }
        self.ctx.auto.register(user_id, slot, rule)
    }

    pub fn clear_auto_action(&self, user_id: &UserId, slot: Slot) {
        self.ctx.auto.clear(user_id, slot);
    }

    /// Force the current round to `Voided`. Returns `false` if the round
    /// had already settled.
    pub async fn void_round(&self, reason: impl Into<String>) -> Result<bool, RoundError> {
        let round_id = self.snapshot().round.id;
        let (reply, response) = oneshot::channel();
        self.commands
            .send(TableCommand::Void {
                reason: reason.into(),
                reply,
            })
            .await
            .map_err(|_| RoundError::Cancelled(round_id.clone()))?;
        response.await.map_err(|_| RoundError::Cancelled(round_id))
    }

    async fn shutdown(&self) {
        // A closed channel means the runner is already gone
        let _ = self.commands.send(TableCommand::Shutdown).await;
    }
}

/// Every table of the engine plus the shared collaborators
pub struct Casino {
    tables: DashMap<TableId, Arc<TableHandle>>,
    tasks: DashMap<TableId, JoinHandle<()>>,
    wallet: Arc<dyn Wallet>,
    history: Arc<dyn HistoryStore>,
    generator: Arc<dyn OutcomeGenerator>,
    vrf: Arc<VRFGameEngine>,
    settlement: SettlementConfig,
    metrics: EngineMetrics,
}

impl Casino {
    pub fn builder(config: EngineConfig) -> CasinoBuilder {
        CasinoBuilder::new(config)
    }

    /// Start a runner for `config`. Must be called inside a tokio runtime.
    pub fn open_table(&self, config: TableConfig) -> EngineResult<Arc<TableHandle>> {
        validate_table(&config)?;
        if self.tables.contains_key(&config.id) {
            return Err(ConfigurationError::InvalidValue {
                field: "tables.id".to_string(),
                value: config.id.to_string(),
                reason: "Table already open".to_string(),
            }
            .into());
        }

        let ledger = BetLedger::new(&config, self.wallet.clone(), self.metrics.clone());
        let settlement = Arc::new(SettlementEngine::new(
            self.wallet.clone(),
            self.history.clone(),
            self.settlement.concurrency,
        ));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ctx = Arc::new(TableContext {
            config: config.clone(),
            ledger,
            auto: AutoActionEngine::new(),
            settlement,
            events,
            metrics: self.metrics.clone(),
        });

        let (runner, commands, snapshot) =
            TableRunner::new(ctx.clone(), self.generator.clone(), self.vrf.clone(), self.settlement);
        let handle = Arc::new(TableHandle {
            ctx,
            commands,
            snapshot,
        });

        self.tasks.insert(config.id.clone(), runner.spawn());
        self.tables.insert(config.id.clone(), handle.clone());
        info!(table = %config.id, game = %config.game_type, "Table opened");
        Ok(handle)
    }

    pub fn table(&self, table_id: &TableId) -> Result<Arc<TableHandle>, BetError> {
        self.tables
            .get(table_id)
            .map(|t| t.clone())
            .ok_or_else(|| BetError::UnknownTable(table_id.clone()))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        ids
    }

    pub async fn place_bet(&self, table_id: &TableId, request: BetRequest) -> Result<Bet, BetError> {
        self.table(table_id)?.place_bet(request).await
    }

    pub async fn cash_out(&self, table_id: &TableId, user_id: &UserId, slot: Slot) -> EngineResult<Bet> {
        Ok(self.table(table_id)?.cash_out(user_id, slot).await?)
    }

    pub fn register_auto_action(
        &self,
        table_id: &TableId,
        user_id: UserId,
        slot: Slot,
        rule: AutoRule,
    ) -> Result<(), BetError> {
        self.table(table_id)?.register_auto_action(user_id, slot, rule)
    }

    pub fn get_round_state(&self, table_id: &TableId) -> Result<RoundSnapshot, BetError> {
        Ok(self.table(table_id)?.snapshot())
    }

    pub fn subscribe(&self, table_id: &TableId) -> Result<broadcast::Receiver<TableEvent>, BetError> {
        Ok(self.table(table_id)?.subscribe())
    }

    pub async fn void_round(&self, table_id: &TableId, reason: impl Into<String>) -> EngineResult<bool> {
        Ok(self.table(table_id)?.void_round(reason).await?)
    }

    /// Most recent settled rounds of a game, newest first
    pub async fn recent_history(&self, game_type: GameType, limit: usize) -> EngineResult<Vec<HistoryEntry>> {
        self.history.list_recent(game_type, limit).await
    }

    pub async fn balance(&self, user_id: &UserId) -> Result<u64, WalletError> {
        self.wallet.balance(user_id).await
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Hex public key players verify round seeds against
    pub fn fairness_key(&self) -> String {
        self.vrf.public_key_hex()
    }

    /// Stop every table. Rounds not yet settled are voided and refunded.
    pub async fn shutdown(&self) {
        let tables: Vec<Arc<TableHandle>> = self.tables.iter().map(|t| t.value().clone()).collect();
        for table in tables {
            table.shutdown().await;
        }
        let ids: Vec<TableId> = self.tasks.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                if let Err(e) = task.await {
                    warn!(table = %id, error = %e, "Table runner ended abnormally");
                }
            }
        }
        info!("All tables stopped");
    }
}

/// Wires collaborators and opens every configured table
pub struct CasinoBuilder {
    config: EngineConfig,
    wallet: Option<Arc<dyn Wallet>>,
    history: Option<Arc<dyn HistoryStore>>,
    generator: Option<Arc<dyn OutcomeGenerator>>,
}

impl CasinoBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            wallet: None,
            history: None,
            generator: None,
        }
    }

    pub fn with_wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn OutcomeGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn build(self) -> EngineResult<Casino> {
        ConfigLoader::new().validate(&self.config)?;

        let vrf = match &self.config.vrf_seed {
            Some(seed_hex) => VRFGameEngine::from_seed(&parse_seed(seed_hex)?).map_err(|reason| {
                ConfigurationError::InvalidValue {
                    field: "vrf_seed".to_string(),
                    value: "<redacted>".to_string(),
                    reason,
                }
            })?,
            None => VRFGameEngine::new_random(),
        };

        let casino = Casino {
            tables: DashMap::new(),
            tasks: DashMap::new(),
            wallet: self.wallet.unwrap_or_else(|| Arc::new(InMemoryWallet::new())),
            history: self
                .history
                .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new(self.config.history_capacity))),
            generator: self.generator.unwrap_or_else(|| Arc::new(StandardOutcomes)),
            vrf: Arc::new(vrf),
            settlement: self.config.settlement,
            metrics: EngineMetrics::new(),
        };

        for table in &self.config.tables {
            casino.open_table(table.clone())?;
        }
        Ok(casino)
    }
}

fn parse_seed(seed_hex: &str) -> Result<[u8; 32], EngineError> {
    let invalid = |reason: &str| ConfigurationError::InvalidValue {
        field: "vrf_seed".to_string(),
        value: "<redacted>".to_string(),
        reason: reason.to_string(),
    };
    let bytes = hex::decode(seed_hex).map_err(|_| invalid("Not valid hex"))?;
    let seed: [u8; 32] = bytes.try_into().map_err(|_| invalid("Expected 32 bytes"))?;
    Ok(seed)
}
