use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use holdfast::config::{self, Config};
use holdfast::{pricing, wire, Engine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env()?;
    holdfast::observability::init(cfg.metrics_port)?;

    let range_pricing = pricing::from_name(&cfg.range_pricing)
        .ok_or_else(|| format!("unknown range pricing {:?}", cfg.range_pricing))?;
    let mut builder = Engine::builder().range_pricing(range_pricing);
    if let Some(path) = &cfg.inventory {
        let resources = config::load_inventory(path)?;
        info!("loading {} resources from {}", resources.len(), path.display());
        builder = builder.resources(resources);
    }
    let engine = Arc::new(builder.build()?);

    let addr = format!("{}:{}", cfg.bind, cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("holdfast listening on {addr}");
    info!("  max_connections: {}", cfg.max_connections);
    info!("  default hold: {}s", cfg.default_hold.as_secs());
    info!("  range pricing: {}", cfg.range_pricing);
    info!("  metrics: {}", cfg.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let opts = wire::ServeOptions {
        max_connections: cfg.max_connections,
        default_hold: cfg.default_hold,
        drain_timeout: Duration::from_secs(10),
    };
    wire::serve(listener, engine, opts, shutdown_signal()).await;

    info!("holdfast stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
