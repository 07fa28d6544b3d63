use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateflow::config::Config;
use gateflow::coupons::spawn_reservation_sweeper;
use gateflow::db::{AppState, create_pool, init_db, queries};
use gateflow::handlers;
use gateflow::models::{CreateCoupon, CreateProduct, DiscountType};
use gateflow::payments::PaymentClient;

#[derive(Parser, Debug)]
#[command(name = "gateflow")]
#[command(about = "Checkout backend with race-safe coupon reservations")]
struct Cli {
    /// Bind host (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long)]
    db: Option<String>,

    /// Seed the database with demo data (product, order bump, coupons)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the catalog with demo data for local testing.
/// Creates: a main product, an order bump, and two coupons.
/// Only runs when the database is empty.
fn seed_demo_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let (_, existing) =
        queries::list_products_paginated(&conn, 1, 0).expect("Failed to count products");
    if existing > 0 {
        tracing::info!("Catalog already populated, skipping demo seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEMO DATA");
    tracing::info!("============================================");

    let product = queries::create_product(
        &conn,
        &CreateProduct {
            name: "Video Course".to_string(),
            price_cents: 14900,
            currency: None,
            is_order_bump: false,
        },
    )
    .expect("Failed to create demo product");
    tracing::info!("Product: {} (id: {})", product.name, product.id);

    let bump = queries::create_product(
        &conn,
        &CreateProduct {
            name: "Workbook Add-on".to_string(),
            price_cents: 1900,
            currency: None,
            is_order_bump: true,
        },
    )
    .expect("Failed to create demo order bump");
    tracing::info!("Order bump: {} (id: {})", bump.name, bump.id);

    let welcome = queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "WELCOME10".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            usage_limit_global: None,
            usage_limit_per_user: Some(1),
            current_usage_count: None,
            is_active: true,
            starts_at: None,
            expires_at: None,
            allowed_product_ids: None,
            allowed_emails: None,
            exclude_order_bumps: true,
        },
    )
    .expect("Failed to create demo coupon");
    tracing::info!("Coupon: {} (per-user limit 1)", welcome.code);

    let launch = queries::create_coupon(
        &conn,
        &CreateCoupon {
            code: "LAUNCH50".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: 5000,
            usage_limit_global: Some(100),
            usage_limit_per_user: Some(1),
            current_usage_count: None,
            is_active: true,
            starts_at: None,
            expires_at: None,
            allowed_product_ids: Some(vec![product.id.clone()]),
            allowed_emails: None,
            exclude_order_bumps: false,
        },
    )
    .expect("Failed to create demo coupon");
    tracing::info!("Coupon: {} (first 100 buyers)", launch.code);

    tracing::info!("============================================");
    tracing::info!("DEMO DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    // Copy-paste friendly output for API clients (no log formatting)
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  product_id: {}", product.id);
    println!("  order_bump_id: {}", bump.id);
    println!("  coupon_codes: {}, {}", welcome.code, launch.code);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration, then apply CLI overrides
    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    if config.dev_mode {
        tracing::info!("Dev mode: demo seeding enabled");
    }
    if config.payment_api_key.is_empty() {
        tracing::warn!("PAYMENT_API_KEY not set - checkout will be refused until configured");
    }

    // Create database connection pool and schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let payments = PaymentClient::new(
        &config.payment_api_url,
        &config.payment_api_key,
        &config.payment_webhook_secret,
    );

    let state = AppState {
        db: db_pool,
        payments,
        base_url: config.base_url.clone(),
        success_page_url: config.success_page_url.clone(),
    };

    // Seed demo data if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set GATEFLOW_ENV=dev)");
        } else {
            seed_demo_data(&state);
        }
    }

    // Reclaim abandoned coupon holds in the background
    spawn_reservation_sweeper(state.clone());

    // Build the application router
    let app = Router::new()
        // Buyer-facing endpoints (rate limited per IP)
        .merge(handlers::public::router(config.rate_limit))
        // Payment provider events (signature auth)
        .merge(handlers::webhooks::router())
        // Management endpoints (private network boundary)
        .merge(handlers::admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("GateFlow server listening on {}", addr);

    // Run server with graceful shutdown
    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
