use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use meter_client::{
    api::identify_locally,
    domain::{ContactInfo, GeoBounds, GeoPoint, Meter, MeterSlot},
};
use tokio::time::sleep;

use super::*;
use crate::districts::fixtures::square;

/// In-memory backend with scripted latency and failures.
#[derive(Default)]
struct FakeBackend {
    entities: Vec<Entity>,
    viewport_delays: Mutex<VecDeque<Duration>>,
    fail_viewport: AtomicBool,
    fail_detail: AtomicBool,
    viewport_calls: Mutex<Vec<ViewportQuery>>,
    detail_calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn with_entities(entities: Vec<Entity>) -> Arc<Self> {
        Arc::new(Self {
            entities,
            ..Default::default()
        })
    }

    fn delay_next_viewport(&self, delay: Duration) {
        self.viewport_delays.lock().unwrap().push_back(delay);
    }

    fn viewport_calls(&self) -> Vec<ViewportQuery> {
        self.viewport_calls.lock().unwrap().clone()
    }

    fn detail_calls(&self) -> usize {
        self.detail_calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl SpatialFetchClient for FakeBackend {
    async fn points_in_viewport(&self, query: &ViewportQuery) -> Result<Vec<Entity>, FetchError> {
        self.viewport_calls.lock().unwrap().push(query.clone());
        let delay = self.viewport_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if self.fail_viewport.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                status: 503,
                url: "/lecturas".to_string(),
            });
        }
        Ok(self
            .entities
            .iter()
            .filter(|e| query.bounds.contains(&e.location))
            .take(query.record_limit as usize)
            .cloned()
            .collect())
    }

    async fn entity_detail(&self, id: &str, _as_of: &AsOf) -> Result<Entity, FetchError> {
        self.detail_calls.lock().unwrap().push(id.to_string());
        sleep(Duration::from_millis(20)).await;
        if self.fail_detail.load(Ordering::SeqCst) {
            return Err(FetchError::Status {
                status: 500,
                url: format!("/api/clientes/{id}"),
            });
        }
        let mut detail = self
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))?;
        detail.meters = detail
            .meters
            .iter()
            .map(|slot| MeterSlot::Resolved(meter(slot.code())))
            .collect();
        Ok(detail)
    }

    async fn identify(&self, query: &str, _as_of: &AsOf) -> Result<Vec<Entity>, FetchError> {
        sleep(Duration::from_millis(20)).await;
        Ok(identify_locally(self.entities.clone(), query))
    }
}

fn meter(code: &str) -> Meter {
    Meter {
        code: code.to_string(),
        model: Some("Ultrasonic DN15".to_string()),
        status: Some("Normal".to_string()),
        read_at: Some("2024-05-01 07:45".to_string()),
        last_reading: Some(1532.4),
        period_consumption: Some(12.5),
        tariff: None,
    }
}

fn entity(id: &str, lat: f64, lon: f64) -> Entity {
    Entity {
        id: id.to_string(),
        name: format!("Cliente {id}"),
        contact: ContactInfo::default(),
        location: GeoPoint::new(lat, lon).unwrap(),
        district: None,
        zone: None,
        meters: vec![MeterSlot::Pending(format!("MX-{id}"))],
    }
}

/// A and B lie inside district D1, C south of it, D far east.
fn dataset() -> Vec<Entity> {
    vec![
        entity("CT-1", -17.35, -66.15),
        entity("CT-2", -17.36, -66.12),
        entity("CT-3", -17.45, -66.15),
        entity("CT-9", -17.25, -65.90),
    ]
}

fn d1() -> DistrictShapeIndex {
    [square("D1", (-17.40, -17.30), (-66.20, -66.10))].into_iter().collect()
}

fn bounds(lat: (f64, f64), lon: (f64, f64)) -> GeoBounds {
    GeoBounds::new(GeoPoint::new(lat.0, lon.0).unwrap(), GeoPoint::new(lat.1, lon.1).unwrap())
}

/// Covers CT-1, CT-2 and CT-3.
fn city(zoom: u8) -> Viewport {
    Viewport {
        bounds: bounds((-17.50, -17.20), (-66.30, -66.00)),
        zoom,
    }
}

/// Covers only CT-3.
fn south(zoom: u8) -> Viewport {
    Viewport {
        bounds: bounds((-17.50, -17.42), (-66.30, -66.00)),
        zoom,
    }
}

fn context() -> QueryContext {
    QueryContext {
        as_of: AsOf::parse("2024-05-01 08:00").unwrap(),
        district_id: None,
        record_limit: 10_000,
    }
}

fn start_with(backend: &Arc<FakeBackend>, options: EngineOptions, districts: DistrictShapeIndex) -> RunningEngine {
    ViewportSyncEngine::spawn(backend.clone(), options, context(), futures::future::ready(districts))
}

fn start(backend: &Arc<FakeBackend>) -> RunningEngine {
    start_with(backend, EngineOptions::default(), d1())
}

async fn settle() {
    sleep(Duration::from_secs(1)).await;
}

fn drain(rx: &mut mpsc::UnboundedReceiver<MapCommand>) -> Vec<MapCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

fn visible_ids(engine: &RunningEngine) -> Vec<String> {
    engine.handle.snapshot().visible.ids().into_iter().map(str::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn burst_of_viewport_changes_triggers_one_fetch_for_the_last() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    for zoom in [12, 13, 15] {
        engine.handle.send(MapEvent::ViewportChanged { viewport: city(zoom) }).await.unwrap();
        sleep(Duration::from_millis(30)).await;
    }
    settle().await;

    let calls = backend.viewport_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bounds, city(15).bounds);
    assert_eq!(calls[0].record_limit, 10_000);

    let state = engine.handle.snapshot();
    assert_eq!(state.status, SyncStatus::Fresh);
    assert_eq!(state.generation, 1);
    assert_eq!(state.tier, RenderTier::Markers);
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3"]);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_fetched_before_the_first_viewport() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine
        .handle
        .send(MapEvent::RecordLimitChanged { record_limit: 50 })
        .await
        .unwrap();
    settle().await;

    assert!(backend.viewport_calls().is_empty());
    let state = engine.handle.snapshot();
    assert_eq!(state.status, SyncStatus::Idle);
    assert_eq!(state.context.record_limit, 50);
}

#[tokio::test(start_paused = true)]
async fn late_response_from_superseded_refresh_is_discarded() {
    let backend = FakeBackend::with_entities(dataset());
    backend.delay_next_viewport(Duration::from_millis(500));
    backend.delay_next_viewport(Duration::from_millis(10));
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.handle.snapshot().status, SyncStatus::Refreshing);

    engine.handle.send(MapEvent::ViewportChanged { viewport: south(15) }).await.unwrap();
    settle().await;

    assert_eq!(backend.viewport_calls().len(), 2);
    assert_eq!(visible_ids(&engine), vec!["CT-3"]);
    assert_eq!(engine.handle.snapshot().generation, 1);
}

#[tokio::test(start_paused = true)]
async fn district_selection_filters_locally_and_fits_once() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    engine
        .handle
        .send(MapEvent::DistrictSelected {
            district_id: Some("D1".to_string()),
        })
        .await
        .unwrap();
    settle().await;

    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2"]);
    let fits: Vec<_> = drain(&mut engine.commands)
        .into_iter()
        .filter(|c| matches!(c, MapCommand::FitBounds(_)))
        .collect();
    assert_eq!(fits, vec![MapCommand::FitBounds(bounds((-17.40, -17.30), (-66.20, -66.10)))]);

    // Re-selecting the same district neither refits nor refetches.
    engine
        .handle
        .send(MapEvent::DistrictSelected {
            district_id: Some("D1".to_string()),
        })
        .await
        .unwrap();
    settle().await;

    assert!(drain(&mut engine.commands).is_empty());
    assert_eq!(backend.viewport_calls().len(), 1);
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2"]);
}

#[tokio::test(start_paused = true)]
async fn clearing_district_restores_full_set_from_last_response() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    engine
        .handle
        .send(MapEvent::DistrictSelected {
            district_id: Some("D1".to_string()),
        })
        .await
        .unwrap();
    settle().await;
    drain(&mut engine.commands);

    engine.handle.send(MapEvent::DistrictSelected { district_id: None }).await.unwrap();
    settle().await;
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3"]);
    assert!(drain(&mut engine.commands).is_empty());

    // Selecting it again after clearing refits the camera.
    engine
        .handle
        .send(MapEvent::DistrictSelected {
            district_id: Some("D1".to_string()),
        })
        .await
        .unwrap();
    settle().await;
    assert!(matches!(drain(&mut engine.commands).as_slice(), [MapCommand::FitBounds(_)]));
    assert_eq!(backend.viewport_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn as_of_change_refetches_with_new_timestamp() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;

    let later = AsOf::parse("2024-05-01 16:00").unwrap();
    engine
        .handle
        .send(MapEvent::AsOfChanged { as_of: later.clone() })
        .await
        .unwrap();
    settle().await;

    let calls = backend.viewport_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].as_of, later);
    assert_eq!(engine.handle.snapshot().context.as_of, later);
    assert_eq!(engine.handle.snapshot().generation, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_previous_set_and_degrades() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    let before = engine.handle.snapshot();

    backend.fail_viewport.store(true, Ordering::SeqCst);
    engine.handle.send(MapEvent::ViewportChanged { viewport: south(15) }).await.unwrap();
    settle().await;

    let after = engine.handle.snapshot();
    assert!(Arc::ptr_eq(&before.visible, &after.visible));
    assert_eq!(after.generation, before.generation);
    assert!(matches!(after.status, SyncStatus::Degraded { ref reason } if reason.contains("503")));

    // The next successful refresh recovers.
    backend.fail_viewport.store(false, Ordering::SeqCst);
    engine.handle.send(MapEvent::ViewportChanged { viewport: south(14) }).await.unwrap();
    settle().await;
    assert_eq!(engine.handle.snapshot().status, SyncStatus::Fresh);
    assert_eq!(visible_ids(&engine), vec!["CT-3"]);
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out() {
    let backend = FakeBackend::with_entities(dataset());
    backend.delay_next_viewport(Duration::from_secs(5));
    let options = EngineOptions {
        fetch_timeout: Some(Duration::from_millis(200)),
        ..EngineOptions::default()
    };
    let engine = start_with(&backend, options, d1());

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    sleep(Duration::from_secs(10)).await;

    let state = engine.handle.snapshot();
    assert!(state.visible.is_empty());
    assert!(matches!(state.status, SyncStatus::Degraded { ref reason } if reason.contains("timed out")));
}

#[tokio::test(start_paused = true)]
async fn render_tier_follows_zoom() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    for (zoom, tier) in [(5, RenderTier::None), (12, RenderTier::Heat), (16, RenderTier::Markers)] {
        engine.handle.send(MapEvent::ViewportChanged { viewport: city(zoom) }).await.unwrap();
        settle().await;
        assert_eq!(engine.handle.snapshot().tier, tier, "zoom {zoom}");
    }
}

#[tokio::test(start_paused = true)]
async fn single_search_hit_is_injected_centered_and_opened_once() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    engine
        .handle
        .send(MapEvent::Search {
            query: " ct-9 ".to_string(),
        })
        .await
        .unwrap();
    settle().await;

    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3", "CT-9"]);
    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::CenterOn {
            point: GeoPoint::new(-17.25, -65.90).unwrap(),
            zoom: 18,
        }]
    );

    for id in ["CT-1", "CT-9", "CT-9"] {
        engine
            .handle
            .send(MapEvent::MarkerMounted {
                entity_id: id.to_string(),
            })
            .await
            .unwrap();
    }
    settle().await;
    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::OpenPopup {
            entity_id: "CT-9".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn multiple_and_missing_search_hits() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine
        .handle
        .send(MapEvent::Search {
            query: "cliente".to_string(),
        })
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::FitBounds(bounds((-17.45, -17.25), (-66.15, -65.90)))]
    );

    engine
        .handle
        .send(MapEvent::Search {
            query: "nadie".to_string(),
        })
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::Notice(Notice::NoMatch {
            query: "nadie".to_string()
        })]
    );
    assert!(engine.handle.snapshot().visible.is_empty());
}

#[tokio::test(start_paused = true)]
async fn superseded_search_result_is_ignored() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::Search { query: "CT-9".to_string() }).await.unwrap();
    engine.handle.send(MapEvent::Search { query: "nadie".to_string() }).await.unwrap();
    settle().await;

    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::Notice(Notice::NoMatch {
            query: "nadie".to_string()
        })]
    );
    assert!(engine.handle.snapshot().visible.is_empty());
}

#[tokio::test(start_paused = true)]
async fn popup_detail_is_merged_and_reused() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    let before = engine.handle.snapshot().visible;

    let select = MapEvent::EntitySelected {
        entity_id: "CT-1".to_string(),
    };
    engine.handle.send(select.clone()).await.unwrap();
    engine.handle.send(select.clone()).await.unwrap();
    settle().await;

    let commands = drain(&mut engine.commands);
    assert_eq!(
        &commands[..2],
        &[
            MapCommand::Popup {
                entity_id: "CT-1".to_string(),
                view: PopupView::Loading
            },
            MapCommand::Popup {
                entity_id: "CT-1".to_string(),
                view: PopupView::Loading
            },
        ]
    );
    assert!(matches!(&commands[2], MapCommand::Popup { view: PopupView::Ready(d), .. }
        if d.meters[0].resolved().is_some()));
    assert_eq!(commands.len(), 3);
    assert_eq!(backend.detail_calls(), 1);

    let after = engine.handle.snapshot().visible;
    assert_eq!(after.ids(), before.ids());
    assert!(after.get("CT-1").unwrap().meters[0].resolved().is_some());
    assert!(Arc::ptr_eq(after.get("CT-2").unwrap(), before.get("CT-2").unwrap()));
    assert!(Arc::ptr_eq(after.get("CT-3").unwrap(), before.get("CT-3").unwrap()));

    // Cached: answered immediately, no new request.
    engine.handle.send(select).await.unwrap();
    settle().await;
    assert!(matches!(
        drain(&mut engine.commands).as_slice(),
        [MapCommand::Popup {
            view: PopupView::Ready(_),
            ..
        }]
    ));
    assert_eq!(backend.detail_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_detail_stays_loading_and_retries_on_next_selection() {
    let backend = FakeBackend::with_entities(dataset());
    let mut engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    let before = engine.handle.snapshot();

    backend.fail_detail.store(true, Ordering::SeqCst);
    let select = MapEvent::EntitySelected {
        entity_id: "CT-2".to_string(),
    };
    engine.handle.send(select.clone()).await.unwrap();
    settle().await;

    assert_eq!(
        drain(&mut engine.commands),
        vec![MapCommand::Popup {
            entity_id: "CT-2".to_string(),
            view: PopupView::Loading
        }]
    );
    assert_eq!(engine.handle.snapshot().generation, before.generation);

    backend.fail_detail.store(false, Ordering::SeqCst);
    engine.handle.send(select).await.unwrap();
    settle().await;

    assert_eq!(backend.detail_calls(), 2);
    assert!(matches!(
        drain(&mut engine.commands).last(),
        Some(MapCommand::Popup {
            view: PopupView::Ready(_),
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn district_index_arriving_late_applies_filter_and_focus() {
    let backend = FakeBackend::with_entities(dataset());
    let districts = async {
        sleep(Duration::from_millis(500)).await;
        d1()
    };
    let mut engine = ViewportSyncEngine::spawn(backend.clone(), EngineOptions::default(), context(), districts);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    engine
        .handle
        .send(MapEvent::DistrictSelected {
            district_id: Some("D1".to_string()),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    // Unknown district: no filtering yet.
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3"]);
    assert!(drain(&mut engine.commands).is_empty());

    settle().await;
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2"]);
    assert!(matches!(drain(&mut engine.commands).as_slice(), [MapCommand::FitBounds(_)]));
    assert_eq!(backend.viewport_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_discards_pending_refresh() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    engine.handle.shutdown();
    engine.task.await.unwrap();

    settle().await;
    assert!(backend.viewport_calls().is_empty());
    assert!(engine
        .handle
        .send(MapEvent::ViewportChanged { viewport: city(15) })
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn unchanged_filters_keep_merged_detail_and_injected_entities() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    engine
        .handle
        .send(MapEvent::EntitySelected {
            entity_id: "CT-1".to_string(),
        })
        .await
        .unwrap();
    settle().await;

    let merged = engine.handle.snapshot();
    assert!(merged.visible.get("CT-1").unwrap().meters[0].resolved().is_some());

    for event in [
        MapEvent::DistrictSelected { district_id: None },
        MapEvent::AsOfChanged {
            as_of: AsOf::parse("2024-05-01 08:00").unwrap(),
        },
        MapEvent::RecordLimitChanged { record_limit: 10_000 },
    ] {
        engine.handle.send(event).await.unwrap();
    }
    settle().await;

    let after = engine.handle.snapshot();
    assert_eq!(after.generation, merged.generation);
    assert!(Arc::ptr_eq(&after.visible, &merged.visible));
    assert_eq!(backend.viewport_calls().len(), 1);

    // Zoom without panning: served from the last response, membership kept.
    engine.handle.send(MapEvent::ViewportChanged { viewport: city(16) }).await.unwrap();
    settle().await;
    let zoomed = engine.handle.snapshot();
    assert_eq!(zoomed.generation, merged.generation);
    assert!(zoomed.visible.get("CT-1").unwrap().meters[0].resolved().is_some());
    assert_eq!(backend.viewport_calls().len(), 1);

    engine.handle.send(MapEvent::Search { query: "CT-9".to_string() }).await.unwrap();
    settle().await;
    engine
        .handle
        .send(MapEvent::DistrictSelected { district_id: None })
        .await
        .unwrap();
    settle().await;
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3", "CT-9"]);

    // A real refetch brings summaries back, but the loaded detail is reused.
    engine.handle.send(MapEvent::ViewportChanged { viewport: south(15) }).await.unwrap();
    settle().await;
    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    assert_eq!(backend.viewport_calls().len(), 3);
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3"]);
    let refetched = engine.handle.snapshot();
    assert!(refetched.visible.get("CT-1").unwrap().meters[0].resolved().is_some());
    assert_eq!(backend.detail_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn searched_entity_survives_failed_refresh_until_next_success() {
    let backend = FakeBackend::with_entities(dataset());
    let engine = start(&backend);

    engine.handle.send(MapEvent::ViewportChanged { viewport: city(15) }).await.unwrap();
    settle().await;
    engine.handle.send(MapEvent::Search { query: "CT-9".to_string() }).await.unwrap();
    settle().await;
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3", "CT-9"]);

    backend.fail_viewport.store(true, Ordering::SeqCst);
    engine.handle.send(MapEvent::ViewportChanged { viewport: south(15) }).await.unwrap();
    settle().await;
    assert!(matches!(engine.handle.snapshot().status, SyncStatus::Degraded { .. }));
    assert_eq!(visible_ids(&engine), vec!["CT-1", "CT-2", "CT-3", "CT-9"]);

    backend.fail_viewport.store(false, Ordering::SeqCst);
    engine.handle.send(MapEvent::ViewportChanged { viewport: south(14) }).await.unwrap();
    settle().await;
    assert_eq!(engine.handle.snapshot().status, SyncStatus::Fresh);
    assert_eq!(visible_ids(&engine), vec!["CT-3"]);
}
