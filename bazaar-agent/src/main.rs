//! Bazaar agent entry point: a headless daemon that listens, transcribes,
//! extracts transactions, persists them durably, and syncs them to the
//! remote API when the network allows it.

mod config;
mod error;
mod storage;
mod sync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bazaar_core::ipc::events::TransactionOutcome;
use bazaar_core::vocabulary::VocabularyStore;
use bazaar_core::{BazaarEngine, EngineConfig, SpeakerRoster};
use chrono::Utc;
use tracing::{info, warn};

use config::{default_config_path, load_config, AgentConfig, Clock, SystemClock};
use storage::{AgentStore, OperationPriority};
use sync::{strategy_for, HttpSyncClient, NetworkMonitor, NetworkQuality, NetworkSignal, OfflineQueue, SyncClient};

/// Network monitor backed by the engine's own `network_available` flag —
/// the agent has no richer platform connectivity API to poll, so quality
/// is inferred from availability alone.
struct EngineNetworkMonitor {
    available: Arc<AtomicBool>,
}

impl NetworkMonitor for EngineNetworkMonitor {
    fn current(&self) -> NetworkSignal {
        let available = self.available.load(Ordering::SeqCst);
        NetworkSignal {
            available,
            metered: false,
            quality: if available { NetworkQuality::Good } else { NetworkQuality::Poor },
        }
    }
}

/// How often the sync worker re-evaluates the network and drains the
/// offline queue, per spec §5's 15 s network-quality reassessment window.
const SYNC_TICK: Duration = Duration::from_secs(15);

/// How often daily summaries are recomputed and stale rows garbage
/// collected.
const MAINTENANCE_TICK: Duration = Duration::from_secs(60);

fn engine_config(config: &AgentConfig) -> EngineConfig {
    let mut engine_config = EngineConfig::default();
    engine_config.online_recognizer_endpoint = config.online_recognizer_endpoint.clone();
    engine_config.recognizer_languages = if config.toggles.enable_multi_language {
        config.recognizer_languages.clone()
    } else {
        config
            .recognizer_languages
            .first()
            .cloned()
            .into_iter()
            .collect()
    };
    engine_config
}

fn load_roster(store: &AgentStore, enable_speaker_identification: bool) -> SpeakerRoster {
    if !enable_speaker_identification {
        return SpeakerRoster::default();
    }
    let seller = store.get_seller_profile().unwrap_or_else(|e| {
        warn!("failed to load seller profile: {e}");
        None
    });
    let customers = store.list_customer_profiles().unwrap_or_else(|e| {
        warn!("failed to load customer profiles: {e}");
        Vec::new()
    });
    SpeakerRoster { seller, customers }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bazaar_agent=info".parse().unwrap()),
        )
        .init();

    info!("bazaar-agent starting");

    let config_path = default_config_path();
    let config = load_config(&config_path);
    info!(
        config_path = ?config_path,
        online_recognizer = config.online_recognizer_endpoint.is_some(),
        sync_enabled = config.sync_api_base_url.is_some(),
        "agent configuration loaded"
    );

    let store = Arc::new(
        AgentStore::open(AgentStore::default_db_path()).expect("failed to open durable store"),
    );

    let vocabulary = {
        let entries = store.list_product_vocabulary().unwrap_or_else(|e| {
            warn!("failed to load product vocabulary: {e}");
            Vec::new()
        });
        if entries.is_empty() {
            VocabularyStore::new()
        } else {
            VocabularyStore::seed(entries)
        }
    };

    let roster = load_roster(&store, config.toggles.enable_speaker_identification);

    let engine = Arc::new(BazaarEngine::new(engine_config(&config), vocabulary));
    if let Err(e) = engine.start_with_device(config.preferred_input_device.clone(), roster) {
        tracing::error!("failed to start engine: {e}");
        return;
    }

    let queue = Arc::new(OfflineQueue::new(
        Arc::clone(&store),
        config.max_retry_attempts,
        config.max_queue_size,
    ));

    // ── Transaction events → storage + offline queue ───────────────────
    {
        let mut transaction_rx = engine.subscribe_transactions();
        let store = Arc::clone(&store);
        let queue = Arc::clone(&queue);
        let offline_mode_enabled = config.toggles.enable_offline_mode;
        tokio::spawn(async move {
            loop {
                match transaction_rx.recv().await {
                    Ok(event) => {
                        if let TransactionOutcome::Emitted { transaction } = event.outcome {
                            if offline_mode_enabled {
                                let priority = if transaction.needs_review {
                                    OperationPriority::High
                                } else {
                                    OperationPriority::Normal
                                };
                                let payload = match serde_json::to_string(&transaction) {
                                    Ok(p) => p,
                                    Err(e) => {
                                        warn!("failed to serialize transaction {}: {e}", transaction.id);
                                        continue;
                                    }
                                };
                                if let Err(e) = queue.enqueue_with_transaction(&transaction, payload, priority) {
                                    warn!("failed to persist transaction {}: {e}", transaction.id);
                                    continue;
                                }
                            } else if let Err(e) = store.upsert_transaction(&transaction) {
                                warn!("failed to persist transaction {}: {e}", transaction.id);
                                continue;
                            }
                            if let Some(chunk_id) = &event.chunk_id {
                                if let Err(e) = store.link_transaction_chunk(chunk_id, &transaction.id, transaction.timestamp) {
                                    warn!("failed to link audio metadata for transaction {}: {e}", transaction.id);
                                }
                            }
                            info!(transaction_id = %transaction.id, amount = transaction.final_price, "transaction recorded");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("transaction receiver lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Activity events → audio_metadata (ambient diagnostics trail) ────
    {
        let mut activity_rx = engine.subscribe_activity();
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                match activity_rx.recv().await {
                    Ok(event) => {
                        let meta = storage::AudioMetadata {
                            chunk_id: format!("seq-{}", event.seq),
                            timestamp: Utc::now(),
                            vad_score: event.rms,
                            speech_detected: event.is_speech,
                            speaker_id: None,
                            speaker_confidence: None,
                            duration_ms: 10,
                            processing_time_ms: 0,
                            contributed_to_transaction: false,
                            transaction_id: None,
                            battery_level: None,
                            power_saving_mode: false,
                        };
                        if let Err(e) = store.insert_audio_metadata(&meta) {
                            warn!("failed to persist audio metadata: {e}");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("activity receiver lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Status events → logging ─────────────────────────────────────────
    {
        let mut status_rx = engine.subscribe_status();
        tokio::spawn(async move {
            loop {
                match status_rx.recv().await {
                    Ok(event) => info!(status = ?event.status, detail = ?event.detail, "engine status changed"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("status receiver lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Offline sync worker ──────────────────────────────────────────────
    if let Some(base_url) = config.sync_api_base_url.clone() {
        let client: Arc<dyn SyncClient> = match HttpSyncClient::new(base_url, config.sync_api_token.clone().unwrap_or_default()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                warn!("failed to build sync client, sync disabled: {e}");
                Arc::new(NullSyncClient)
            }
        };
        let monitor: Arc<dyn NetworkMonitor> =
            Arc::new(EngineNetworkMonitor { available: engine.network_available_handle() });
        let queue = Arc::clone(&queue);
        tokio::task::spawn_blocking(move || loop {
            let signal = monitor.current();
            let strategy = strategy_for(signal);
            match queue.drain_once(client.as_ref(), strategy, Utc::now()) {
                Ok(n) if n > 0 => info!(synced = n, ?strategy, "offline queue drained"),
                Ok(_) => {}
                Err(e) => warn!("offline queue drain failed: {e}"),
            }
            if let Err(e) = queue.collect_garbage(Utc::now()) {
                warn!("offline queue gc failed: {e}");
            }
            std::thread::sleep(SYNC_TICK);
        });
    } else {
        info!("no sync_api_base_url configured — operating offline-only");
    }

    // ── Maintenance: daily summary recompute, audio metadata retention ──
    {
        let store = Arc::clone(&store);
        let enable_daily_summaries = config.toggles.enable_daily_summaries;
        tokio::task::spawn_blocking(move || {
            let clock = SystemClock;
            loop {
                let now = clock.now_utc();
                if enable_daily_summaries {
                    let date_key = clock.date_key(now);
                    if let Err(e) = store.recompute_daily_summary(&date_key, now) {
                        warn!("failed to recompute daily summary for {date_key}: {e}");
                    }
                }
                if let Err(e) = store.prune_audio_metadata(now) {
                    warn!("failed to prune audio metadata: {e}");
                }
                std::thread::sleep(MAINTENANCE_TICK);
            }
        });
    }

    info!("bazaar-agent running — awaiting shutdown signal");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown requested");
    if let Err(e) = engine.stop() {
        warn!("engine stop failed: {e}");
    }
}

/// No-op client used when the configured sync endpoint can't be reached at
/// startup — the offline queue still accumulates durably and drains once a
/// working client is configured on a later run.
struct NullSyncClient;

impl SyncClient for NullSyncClient {
    fn push_transaction(&self, _tx: &bazaar_core::transaction::Transaction) -> error::Result<sync::PushOutcome<bazaar_core::transaction::Transaction>> {
        Err(error::AgentError::Network("sync client unavailable".into()))
    }
    fn push_summary(&self, _summary: &storage::DailySummary) -> error::Result<sync::PushOutcome<storage::DailySummary>> {
        Err(error::AgentError::Network("sync client unavailable".into()))
    }
    fn push_speaker_profile(
        &self,
        _profile: &bazaar_core::speaker::identifier::SpeakerProfile,
    ) -> error::Result<sync::PushOutcome<bazaar_core::speaker::identifier::SpeakerProfile>> {
        Err(error::AgentError::Network("sync client unavailable".into()))
    }
    fn delete_transaction(&self, _id: &str) -> error::Result<()> {
        Err(error::AgentError::Network("sync client unavailable".into()))
    }
    fn fetch_transactions_since(&self, _since: chrono::DateTime<Utc>) -> error::Result<Vec<bazaar_core::transaction::Transaction>> {
        Err(error::AgentError::Network("sync client unavailable".into()))
    }
}
