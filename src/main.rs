use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paylane::config::Config;
use paylane::db::{create_pool, init_db, queries, AppState};
use paylane::handlers;
use paylane::ledger;
use paylane::models::CreateMerchant;
use paylane::webhooks::{spawn_dispatcher, Dispatcher};

#[derive(Parser, Debug)]
#[command(name = "paylane")]
#[command(about = "Payments platform backend with signed webhook delivery")]
struct Cli {
    /// Seed the database with a dev merchant and print its API key
    #[arg(long)]
    seed: bool,
}

/// Seeds a dev merchant for local testing. Only runs in dev mode and when
/// the database has no merchants yet.
fn seed_dev_merchant(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM merchants", [], |row| row.get(0))
        .expect("Failed to count merchants");
    if count > 0 {
        tracing::info!("Merchants already exist, skipping seed");
        return;
    }

    let api_key = queries::generate_api_key();
    let input = CreateMerchant {
        name: "Dev Merchant".to_string(),
        fee_percent: None,
        fixed_fee: None,
        livemode: false,
    };
    let merchant = queries::create_merchant(
        &conn,
        &input,
        &api_key,
        state.default_fee_percent,
        state.default_fixed_fee,
    )
    .expect("Failed to create dev merchant");

    tracing::info!("============================================");
    tracing::info!("DEV MERCHANT CREATED");
    tracing::info!("Merchant ID: {}", merchant.id);
    tracing::info!("API Key: {}", api_key);
    tracing::info!("============================================");
    tracing::info!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
    tracing::info!("============================================");
}

/// Spawns the background task that expires overdue pending payments.
fn spawn_expiry_sweep(state: AppState, interval: std::time::Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match ledger::expire_due_payments(&conn, &state.events) {
                    Ok(count) if count > 0 => {
                        tracing::info!("Expired {} overdue pending payments", count);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Expiry sweep failed: {}", e),
                },
                Err(e) => tracing::warn!("Failed to get db connection for expiry sweep: {}", e),
            }
        }
    });

    tracing::info!("Payment expiry sweep started (interval: {:?})", interval);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paylane=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let dispatcher = Dispatcher::new(db_pool.clone(), config.delivery_timeout);
    let events = spawn_dispatcher(dispatcher.clone());

    let state = AppState {
        db: db_pool,
        events,
        dispatcher,
        base_url: config.base_url.clone(),
        default_fee_percent: config.default_fee_percent,
        default_fixed_fee: config.default_fixed_fee,
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set PAYLANE_ENV=dev)");
        } else {
            seed_dev_merchant(&state);
        }
    }

    spawn_expiry_sweep(state.clone(), config.expiry_sweep_interval);

    let app = Router::new()
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Paylane server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
