use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tienda::config::Config;
use tienda::db::{create_pool, init_db, queries, AppState};
use tienda::handlers;
use tienda::models::{CreateProduct, CreateVariant};

#[derive(Parser, Debug)]
#[command(name = "tienda")]
#[command(about = "Order and payment backend for a members-only storefront")]
struct Cli {
    /// Seed the database with dev catalog data (products and variants)
    #[arg(long)]
    seed: bool,
}

/// Seeds the catalog with dev data so checkout and webhook flows can be
/// exercised end to end. Only runs in dev mode and when the catalog is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
        .expect("Failed to count products");
    if count > 0 {
        tracing::info!("Catalog already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV CATALOG");
    tracing::info!("============================================");

    let beer = queries::create_product(
        &conn,
        &CreateProduct {
            name: "Cerveza artesanal 330ml".to_string(),
            price: 2500,
            currency: state.currency.clone(),
            stock: 120,
        },
    )
    .expect("Failed to create dev product");

    let six_pack = queries::create_variant(
        &conn,
        &CreateVariant {
            product_id: beer.id.clone(),
            name: "Six pack".to_string(),
            units: 6,
            price: 13500,
        },
    )
    .expect("Failed to create dev variant");

    let opener = queries::create_product(
        &conn,
        &CreateProduct {
            name: "Destapador".to_string(),
            price: 3000,
            currency: state.currency.clone(),
            stock: 40,
        },
    )
    .expect("Failed to create dev product");

    tracing::info!("Product: {} (id: {})", beer.name, beer.id);
    tracing::info!("Variant: {} (id: {}, units: {})", six_pack.name, six_pack.id, six_pack.units);
    tracing::info!("Product: {} (id: {})", opener.name, opener.id);

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  product_id: {}", beer.id);
    println!("  variant_id: {}", six_pack.id);
    println!("  product_id_2: {}", opener.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tienda=debug,tower_http=debug".into()),
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

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        store_url: config.store_url.clone(),
        currency: config.currency.clone(),
        shipping_flat: config.shipping_flat,
        admin_api_key: config.admin_api_key.clone(),
        mercadopago: config.mercadopago.clone(),
        flow: config.flow.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set TIENDA_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        .merge(handlers::checkout::router())
        .merge(handlers::orders::router())
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("tienda server listening on {}", addr);

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
