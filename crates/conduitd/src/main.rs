//! conduitd — partition-aware MQTT relay daemon.
//!
//! Usage: conduitd [<broker_host> <min_hash> <max_hash> [store_path]]
//!
//! Positional arguments override the config file; see `ConduitConfig`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use conduit_core::config::ConduitConfig;
use conduit_services::{
    BridgeRouter, LinkSide, MemoryRouteStore, Qos, RelaySettings, RouteStore, SqliteRouteStore,
};

mod api;
mod mqtt;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = ConduitConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = ConduitConfig::load().context("failed to load config")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    config.apply_args(&args);
    config.validate().context("invalid configuration")?;

    let range = config.partition()?;
    let topics = config.topics()?;
    let settings = RelaySettings {
        qos: Qos::from_u8(config.relay.qos).unwrap_or_default(),
        retain: config.relay.retain,
    };
    tracing::info!(
        namespace = topics.namespace(),
        min_hash = %range.min(),
        max_hash = %range.max(),
        upstream = %format!("{}:{}", config.upstream.host, config.upstream.port),
        downstream = %format!("{}:{}", config.downstream.host, config.downstream.port),
        "conduitd starting"
    );

    let store = open_store(&config.store.path, config.store.max_routes);

    let (upstream_link, upstream_loop) = mqtt::connect(LinkSide::Upstream, &config.upstream);
    let (downstream_link, downstream_loop) =
        mqtt::connect(LinkSide::Downstream, &config.downstream);

    let router = Arc::new(
        BridgeRouter::new(topics, range, upstream_link, downstream_link, store)
            .with_settings(settings),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let upstream_task = tokio::spawn(mqtt::drive(
        LinkSide::Upstream,
        upstream_loop,
        router.clone(),
        shutdown_tx.subscribe(),
    ));

    let downstream_task = tokio::spawn(mqtt::drive(
        LinkSide::Downstream,
        downstream_loop,
        router.clone(),
        shutdown_tx.subscribe(),
    ));

    let _stats_printer = if config.stats.interval_secs > 0 {
        let router = router.clone();
        let period = Duration::from_secs(config.stats.interval_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                router.log_stats();
            }
        }))
    } else {
        None
    };

    let _status_server = if config.api.port > 0 {
        let router = router.clone();
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(router, port).await {
                tracing::error!(error = %e, "status server failed");
            }
        }))
    } else {
        None
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = upstream_task       => tracing::error!("upstream transport exited: {:?}", r),
        r = downstream_task     => tracing::error!("downstream transport exited: {:?}", r),
    }

    router.log_stats();
    Ok(())
}

/// SQLite at `path`, or memory when the path is empty or cannot be opened.
/// Either way capped at `max_routes`. An unreachable store never stops the
/// relay.
fn open_store(path: &Path, max_routes: usize) -> Arc<dyn RouteStore> {
    let memory = || -> Arc<dyn RouteStore> {
        Arc::new(MemoryRouteStore::new().with_max_routes(max_routes))
    };
    if path.as_os_str().is_empty() {
        tracing::info!(max_routes, "route store: in memory");
        return memory();
    }
    match SqliteRouteStore::open(path) {
        Ok(store) => {
            tracing::info!(path = %path.display(), max_routes, "route store: sqlite");
            Arc::new(store.with_max_routes(max_routes))
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "cannot open route store, falling back to memory"
            );
            memory()
        }
    }
}
