use billing_gateway::adapters::{InMemoryPaymentStore, PostgresPaymentStore};
use billing_gateway::cli::{Cli, Commands, DbCommands};
use billing_gateway::config::{Config, LogFormat, StorageKind};
use billing_gateway::domain::Order;
use billing_gateway::payme::{build_dispatcher, AmountConverter, StatementExporter, SystemClock};
use billing_gateway::ports::PaymentStore;
use billing_gateway::{cli, create_app, db, startup, AppState};
use clap::Parser;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Statement { from, to, format } => {
            let (store, _pool) = open_store(&config).await?;
            let amounts = AmountConverter::new(config.payme.minor_unit_scale)?;
            let exporter =
                StatementExporter::new(store, amounts, config.payme.account_field.clone());
            cli::handle_statement(&exporter, from, to, format, std::io::stdout().lock()).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<(Arc<dyn PaymentStore>, Option<PgPool>)> {
    match config.storage {
        StorageKind::Postgres => {
            let pool = db::create_pool(config).await?;
            let store: Arc<dyn PaymentStore> = Arc::new(PostgresPaymentStore::new(pool.clone()));
            Ok((store, Some(pool)))
        }
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage; payment state is lost on restart");
            let store = InMemoryPaymentStore::new();
            for seed in &config.memory_seed_orders {
                store
                    .insert_order(Order::new(seed.id, seed.amount.clone(), "UZS"))
                    .await;
            }
            if config.memory_seed_orders.is_empty() {
                tracing::warn!("No MEMORY_SEED_ORDERS given; every callback will miss its order");
            } else {
                tracing::info!(count = config.memory_seed_orders.len(), "Seeded in-memory orders");
            }
            Ok((Arc::new(store), None))
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (store, pool) = open_store(&config).await?;

    if let Some(pool) = &pool {
        db::run_migrations(pool).await?;
    }

    let report = startup::validate_environment(&config, pool.as_ref()).await;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }

    let dispatcher = build_dispatcher(&config.payme, store.clone(), Arc::new(SystemClock))?;
    let app = create_app(
        AppState::new(store, dispatcher),
        Duration::from_secs(config.request_timeout_secs),
        config.log_request_body,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
