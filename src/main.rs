use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod config;
mod coordinator;
mod domain;
mod emulator;
mod messaging;
mod metrics;
mod state_machine;
mod store;
mod utils;

use actors::Supervisor;
use config::{AppConfig, ChannelBackend, StoreBackend};
use coordinator::DispenseCoordinator;
use messaging::{ChannelTransport, InProcessChannel, MachineTopics, RedpandaChannel};
use store::{InMemoryOrderStore, OrderStore, ScyllaOrderStore};
use utils::RetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dispense_coordinator=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        machine_id = %config.machine_id,
        port = config.port,
        channel = ?config.channel_backend,
        store = ?config.store_backend,
        "Starting dispense coordinator"
    );

    // === 1. Order store ===
    let store: Arc<dyn OrderStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(InMemoryOrderStore::new()),
        StoreBackend::Scylla => {
            tracing::info!(node = %config.scylla_node, keyspace = %config.scylla_keyspace, "Connecting to ScyllaDB");
            Arc::new(ScyllaOrderStore::connect(&config.scylla_node, &config.scylla_keyspace).await?)
        }
    };

    // === 2. Telemetry/command channel ===
    let channel: Arc<dyn ChannelTransport> = match config.channel_backend {
        ChannelBackend::Memory => Arc::new(InProcessChannel::new()),
        ChannelBackend::Redpanda => {
            tracing::info!(brokers = %config.redpanda_brokers, "Connecting to Redpanda");
            Arc::new(RedpandaChannel::new(&config.redpanda_brokers, &config.redpanda_group_id)?)
        }
    };

    // === 3. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 4. Coordinator and supervised actors ===
    let coordinator = DispenseCoordinator::new(
        store,
        channel,
        MachineTopics::new(config.machine_id.clone()),
        config.dwell,
        RetryConfig::default(),
        metrics.clone(),
    );
    let supervisor = Arc::new(Supervisor::start(coordinator.clone(), config.supervisor_settings()).await?);

    // === 5. HTTP API ===
    let state = api::ApiState {
        coordinator,
        supervisor: supervisor.clone(),
    };
    tracing::info!("HTTP API listening on http://0.0.0.0:{}", config.port);

    let served = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .configure(api::configure)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await;

    supervisor.shutdown().await;
    served?;

    tracing::info!("Dispense coordinator stopped");
    Ok(())
}
