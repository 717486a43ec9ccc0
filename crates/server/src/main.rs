//! fleetdeck server binary: resolves configuration, opens the store, wires
//! up the background components, and serves the HTTP surface.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use fleetdeck_db::{Database, Indexer};
use fleetdeck_live::{EventBus, NeedsInputDetector, TailWatcher};
use fleetdeck_server::config::{Cli, Config};
use fleetdeck_server::push_sender::{load_or_create_vapid_keys, HttpPushSender};
use fleetdeck_server::state::{AppState, SSE_CONNECTION_CAP};
use fleetdeck_server::{create_app, federation};
use fleetdeck_terminal::Multiplexer;
use tokio::sync::{RwLock, Semaphore};
use tracing_subscriber::EnvFilter;

const REINDEX_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    fleetdeck_server::metrics::init_metrics();

    let config = Config::resolve(Cli::parse());
    tracing::info!(hostname = %config.hostname, port = config.port, coordinator = config.coordinator, "starting fleetdeck");

    let db = Database::new(&config.db_path()).await?;
    let indexer = Indexer::new(db.pool().clone(), config.log_root.clone());

    let summary = indexer.reindex_all().await?;
    fleetdeck_server::metrics::set_indexed_sessions(summary.sessions_indexed as i64);
    tracing::info!(
        sessions = summary.sessions_indexed,
        skipped = summary.sessions_skipped,
        removed = summary.sessions_removed,
        "initial index complete"
    );

    let bus = EventBus::new();
    let mux = Multiplexer::default();
    let http = reqwest::Client::new();
    let peers = Arc::new(federation::load_peers(&config.machines_config_path()));

    let vapid_keys = load_or_create_vapid_keys(&config.vapid_keys_path())?;

    let live_sessions = fleetdeck_server::live_tracker::spawn(config.log_root.clone());
    let waiting_sessions: fleetdeck_live::WaitingSetHandle = Arc::new(RwLock::new(HashSet::new()));

    let state = Arc::new(AppState {
        start_time: Instant::now(),
        config: config.clone(),
        db: db.clone(),
        indexer: indexer.clone(),
        bus: bus.clone(),
        mux,
        http: http.clone(),
        peers: peers.clone(),
        live_sessions: live_sessions.clone(),
        waiting_sessions: waiting_sessions.clone(),
        sse_permits: Arc::new(Semaphore::new(SSE_CONNECTION_CAP)),
        vapid_keys,
    });

    spawn_reindex_loop(indexer.clone());
    spawn_tail_watcher(config.log_root.clone(), bus.clone());
    spawn_needs_input_detector(db, bus.clone(), http.clone(), live_sessions, waiting_sessions);

    if config.coordinator && !peers.is_empty() {
        federation::peer_stream::spawn_peer_streams(http, (*peers).clone(), bus);
    }

    let app = create_app(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));

    if config.https {
        if let Some((cert, key)) = config.tls_pair() {
            tracing::info!(port = config.port, cert = %cert.display(), "listening (https)");
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert, &key).await?;
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
            return Ok(());
        }
        tracing::warn!("--https given but no matching cert/key pair found, falling back to http");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(port = config.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

fn spawn_reindex_loop(indexer: Indexer) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REINDEX_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            match indexer.reindex_all().await {
                Ok(summary) => {
                    fleetdeck_server::metrics::set_indexed_sessions(summary.sessions_indexed as i64);
                    tracing::debug!(
                        sessions = summary.sessions_indexed,
                        removed = summary.sessions_removed,
                        "periodic reindex complete"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "periodic reindex failed"),
            }
        }
    });
}

fn spawn_tail_watcher(log_root: std::path::PathBuf, bus: EventBus) {
    tokio::spawn(async move {
        match TailWatcher::new(log_root).await {
            Ok(watcher) => watcher.run(bus).await,
            Err(e) => tracing::error!(error = %e, "tail watcher failed to start"),
        }
    });
}

fn spawn_needs_input_detector(
    db: Database,
    bus: EventBus,
    http: reqwest::Client,
    live_sessions: fleetdeck_server::live_tracker::LiveSetHandle,
    waiting_sessions: fleetdeck_live::WaitingSetHandle,
) {
    let push: Box<dyn fleetdeck_live::PushSender> = Box::new(HttpPushSender::new(
        http,
        db.clone(),
        std::env::var("FLEETDECK_PUSH_ENDPOINT").ok(),
    ));
    let detector = NeedsInputDetector::new(db, bus, Some(push)).with_published_handle(waiting_sessions);
    tokio::spawn(async move {
        detector
            .run(move || {
                let live_sessions = live_sessions.clone();
                async move { live_sessions.read().await.iter().cloned().collect() }
            })
            .await;
    });
}
