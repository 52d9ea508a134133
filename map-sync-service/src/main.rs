use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use map_sync_service::{
    config::AppConfig,
    districts::DistrictShapeIndex,
    engine::{EngineOptions, MapCommand, MapState, ViewportSyncEngine},
    metrics_server, observability,
    session::{self, SessionSource},
};
use meter_client::{
    domain::{AsOf, QueryContext},
    HttpSpatialClient,
};
use tokio::{
    io::{AsyncWriteExt, Stdout},
    sync::{mpsc, watch},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.backend.request_timeout_ms))
        .build()
        .context("failed to build http client")?;
    let client = HttpSpatialClient::with_client(http.clone(), &cfg.backend.base_url, cfg.backend.routes.clone());

    let districts = {
        let districts_cfg = cfg.districts.clone();
        async move {
            match districts_cfg {
                Some(d) => DistrictShapeIndex::load(&d.source, &d.id_property, &http).await,
                None => DistrictShapeIndex::default(),
            }
        }
    };

    let context = QueryContext {
        as_of: cfg.session.as_of.clone().unwrap_or_else(AsOf::now_utc),
        district_id: cfg.session.district_id.clone(),
        record_limit: cfg.engine.record_limit,
    };
    tracing::info!(
        backend = %cfg.backend.base_url,
        as_of = %context.as_of,
        record_limit = context.record_limit,
        "starting map sync"
    );

    let options = EngineOptions::from_config(&cfg.engine)?;
    let running = ViewportSyncEngine::spawn(Arc::new(client), options, context, districts);

    let printer = tokio::spawn(print_commands(running.commands, tokio::io::stdout()));
    let watcher = tokio::spawn(log_state(running.handle.state()));

    let source = SessionSource::new(cfg.session.path.as_deref());
    let replayed = session::replay(source.stream(), &running.handle).await;

    // Let in-flight fetches land before stopping.
    tokio::time::sleep(Duration::from_millis(cfg.session.linger_ms)).await;
    running.handle.shutdown();
    running.task.await.context("engine task panicked")?;
    printer.await.context("command printer panicked")??;
    watcher.await.context("state watcher panicked")?;

    let delivered = replayed?;
    let last = running.handle.snapshot();
    tracing::info!(
        delivered,
        visible = last.visible.len(),
        status = ?last.status,
        "session finished"
    );

    Ok(())
}

/// Write every map command to stdout as one JSON line.
async fn print_commands(mut commands: mpsc::UnboundedReceiver<MapCommand>, mut out: Stdout) -> Result<()> {
    while let Some(command) = commands.recv().await {
        let mut line = serde_json::to_vec(&command)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}

async fn log_state(mut state: watch::Receiver<MapState>) {
    while state.changed().await.is_ok() {
        let s = state.borrow_and_update().clone();
        let heat: f64 = s.heat_layer().iter().map(|p| p.intensity).sum();
        tracing::info!(
            generation = s.generation,
            visible = s.visible.len(),
            heat,
            tier = ?s.tier,
            status = ?s.status,
            district = s.context.district_id.as_deref().unwrap_or("-"),
            "map state"
        );
    }
}
