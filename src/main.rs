use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use ledgerbridge::config::AppConfig;
use ledgerbridge::protocol::{HttpTransport, LedgerClient};
use ledgerbridge::recon::Reconciler;
use ledgerbridge::store::persistence::{FileStateRepository, StateRepository};
use ledgerbridge::store::MirrorStore;
use ledgerbridge::sync::{LoggingEventHandler, OrchestratorSettings, SyncOrchestrator};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    info!("Starting ledger bridge");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ledgerbridge.json"));
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config from {}: {e}", config_path.display());
            return;
        }
    };
    info!(endpoint = %config.endpoint(), "Loaded configuration");

    let transport = HttpTransport::new(config.endpoint(), config.min_request_spacing());
    let client = Arc::new(LedgerClient::new(
        Box::new(transport),
        config.tenant.clone(),
    ));

    let persistence = Arc::new(FileStateRepository::new(config.data_dir.clone()));
    let store = match persistence.load().await {
        Ok(Some(state)) => {
            info!("Restored mirror state from disk");
            Arc::new(MirrorStore::from_state(state, config.store_settings()))
        }
        Ok(None) => Arc::new(MirrorStore::new(config.store_settings())),
        Err(e) => {
            error!("Failed to load persisted state: {e}");
            return;
        }
    };

    let orchestrator = Arc::new(SyncOrchestrator::new(
        client.clone(),
        store.clone(),
        OrchestratorSettings {
            voucher_types: Vec::new(),
            master_interval: config.master_interval(),
        },
        Some(persistence as Arc<dyn StateRepository>),
    ));
    orchestrator
        .register_handler(Box::new(LoggingEventHandler))
        .await;

    match client.check_connection().await {
        Ok(tenants) => {
            info!(count = tenants.len(), "Connected to ledger engine");
            for tenant in &tenants {
                info!(name = %tenant.name, "Tenant available");
            }
        }
        Err(e) => {
            error!("Ledger engine unreachable: {e}");
            return;
        }
    }

    let handles = orchestrator.start_continuous(config.sync_interval());
    if handles.is_empty() {
        info!("Timer disabled, running a single manual cycle");
        if let Err(e) = orchestrator.run_incremental_voucher_sync().await {
            error!("Voucher sync failed: {e}");
        }
        if let Err(e) = orchestrator.run_master_data_sync().await {
            error!("Master data sync failed: {e}");
        }
        let reconciler = Reconciler::new(store.clone(), config.reconciliation.clone());
        for summary in orchestrator.run_matchers(&reconciler).await {
            info!(
                recon = ?summary.recon_type,
                matched = summary.matched,
                unmatched = summary.unmatched,
                "Reconciliation pass complete"
            );
        }
        return;
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Sync task terminated abnormally: {e}");
        }
    }
}
