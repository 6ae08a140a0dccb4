//! Server entry point: load configuration, open the store pool, and run
//! the accept loop until interrupted.

use std::env;
use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tierkv_server::config::Config;
use tierkv_server::handler::RequestHandler;
use tierkv_server::metrics::Metrics;
use tierkv_server::server::serve;
use tierkv_store::{ConnectionPool, PostgresStore, Store, StoreConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::args().nth(1).unwrap_or_else(|| "tierkv.toml".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, path = %config_path, "could not load config, using defaults");
            Config::default()
        }
    };

    let store_config = StoreConfig {
        host: config.store.host.clone(),
        port: config.store.port,
        user: config.store.user.clone(),
        password: config.store.password.clone(),
        database: config.store.database.clone(),
    };

    let pool = ConnectionPool::new(config.pool_size, || {
        PostgresStore::connect(&store_config).map(|store| Box::new(store) as Box<dyn Store>)
    })?;

    let metrics = Arc::new(Metrics::new());
    let handler = Arc::new(RequestHandler::new(&config, pool, metrics));
    let listener = TcpListener::bind(&config.listen_addr)?;
    tracing::info!(addr = %config.listen_addr, "listening");

    let shutdown = Arc::new(AtomicBool::new(false));
    serve(listener, handler, shutdown)?;
    Ok(())
}
