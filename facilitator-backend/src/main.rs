use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod chain;
mod config;
mod controllers;
mod domain_types;
mod eip8004;
mod http;
mod ledger;
mod wallet;

use chain::evm_rpc::{AdapterSettings, EvmAdapterFactory};
use chain::ChainAdapterFactory;
use config::Config;
use eip8004::{AgentRegistrar, FeedbackAuthIssuer, NetworkRegistry};
use ledger::{FallbackStore, KvStore, MemoryStore, RegistrationLedger, SqliteStore};
use wallet::WalletProvider;

pub struct AppState {
    pub config: Config,
    pub networks: Arc<NetworkRegistry>,
    pub chains: Arc<dyn ChainAdapterFactory>,
    pub registrar: Arc<AgentRegistrar>,
    pub feedback_issuer: Arc<FeedbackAuthIssuer>,
    pub ledger: RegistrationLedger,
    /// Pays gas for registration transactions
    pub gas_payer: Option<Arc<dyn WalletProvider>>,
    /// Local fallback for feedback auth signing
    pub owner_signer: Option<Arc<dyn WalletProvider>>,
    pub store_backend: &'static str,
}

fn open_durable_store(database_url: &str) -> Option<Arc<dyn KvStore>> {
    match SqliteStore::open(database_url) {
        Ok(store) => {
            match store.purge_expired() {
                Ok(0) => {}
                Ok(n) => log::info!("[Ledger] Purged {} expired entries", n),
                Err(e) => log::warn!("[Ledger] Startup purge failed: {}", e),
            }
            Some(Arc::new(store) as Arc<dyn KvStore>)
        }
        Err(e) => {
            log::error!("[Ledger] Could not open {}: {}", database_url, e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    let networks = Arc::new(NetworkRegistry::from_env());
    for chain_id in networks.chain_ids() {
        match networks.delegate_contract(chain_id) {
            Ok(delegate) => log::info!("Chain {} delegate contract: {}", chain_id, delegate),
            Err(e) => log::warn!("{}; registrations on chain {} will be rejected", e, chain_id),
        }
    }

    let gas_payer = wallet::local_provider(config.facilitator_private_key.as_deref(), "gas payer")
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let owner_signer = wallet::local_provider(config.agent_owner_private_key.as_deref(), "feedback signer")
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    log::info!("Initializing ledger at {}", config.database_url);
    let durable = open_durable_store(&config.database_url);
    let store_backend = durable.as_ref().map(|d| d.backend_name()).unwrap_or("memory");
    let memory = Arc::new(MemoryStore::new());
    let ledger = RegistrationLedger::new(Arc::new(FallbackStore::new(durable, memory.clone())));

    let shutdown = CancellationToken::new();
    let sweeper = memory.spawn_sweeper(config.ledger_sweep_interval, shutdown.clone());

    let chains: Arc<dyn ChainAdapterFactory> = Arc::new(EvmAdapterFactory::new(
        networks.clone(),
        gas_payer.clone(),
        AdapterSettings::from_config(&config),
    ));
    let registrar = Arc::new(AgentRegistrar::new(networks.clone(), chains.clone(), ledger.clone()));
    let feedback_issuer = Arc::new(FeedbackAuthIssuer::new(networks.clone(), owner_signer.clone()));

    let state = web::Data::new(AppState {
        config,
        networks,
        chains,
        registrar,
        feedback_issuer,
        ledger,
        gas_payer,
        owner_signer,
        store_backend,
    });

    log::info!("Starting facilitator on port {}", port);

    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config_routes)
            .configure(controllers::agents::config_routes)
            .configure(controllers::feedback_auth::config_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        log::warn!("[Ledger] Sweeper ended abnormally: {}", e);
    }

    result
}
