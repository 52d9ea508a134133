//! Viewport-driven synchronization of the visible entity set.
//!
//! The engine runs as a single task that owns all map state. Inputs arrive as
//! [`MapEvent`]s over a channel, network calls are polled inside the task, and
//! results are published through a `watch` channel ([`MapState`]) plus a
//! stream of one-shot [`MapCommand`]s.

pub mod debounce;
pub mod messages;
pub mod state;

#[cfg(test)]
mod tests;

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use meter_client::{
    domain::{AsOf, Entity, QueryContext, Viewport, ViewportQuery},
    FetchError, SpatialFetchClient,
};
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineConfig,
    containment,
    districts::DistrictShapeIndex,
    popup::{PopupDetailLoader, Selection},
    render_tier::{RenderTier, TierThresholds},
    search::{SearchIdentifyFlow, SearchOutcome},
};

pub use debounce::Debouncer;
pub use messages::{MapCommand, MapEvent, Notice, PopupView};
pub use state::{HeatPoint, MapState, SyncStatus, VisibleSet};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub debounce: Duration,
    pub focus_zoom: u8,
    pub thresholds: TierThresholds,
    pub fetch_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            focus_zoom: 18,
            thresholds: TierThresholds::default(),
            fetch_timeout: None,
        }
    }
}

impl EngineOptions {
    pub fn from_config(cfg: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self {
            debounce: Duration::from_millis(cfg.debounce_ms),
            focus_zoom: cfg.focus_zoom,
            thresholds: cfg.thresholds()?,
            fetch_timeout: cfg.fetch_timeout_ms.map(Duration::from_millis),
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("viewport sync engine has stopped")]
pub struct EngineStopped;

/// Cloneable input side of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<MapEvent>,
    state: watch::Receiver<MapState>,
    shutdown: CancellationToken,
}

impl EngineHandle {
    pub async fn send(&self, event: MapEvent) -> Result<(), EngineStopped> {
        self.events.send(event).await.map_err(|_| EngineStopped)
    }

    pub fn state(&self) -> watch::Receiver<MapState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> MapState {
        self.state.borrow().clone()
    }

    /// Stop the engine. Any pending debounced refresh is discarded.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct RunningEngine {
    pub handle: EngineHandle,
    pub commands: mpsc::UnboundedReceiver<MapCommand>,
    pub task: JoinHandle<()>,
}

/// Everything a refresh needs, frozen when the refresh is scheduled.
#[derive(Debug, Clone, PartialEq)]
struct RefreshSnapshot {
    viewport: Viewport,
    context: QueryContext,
}

impl RefreshSnapshot {
    fn query(&self) -> ViewportQuery {
        ViewportQuery::new(self.viewport.bounds, &self.context)
    }
}

struct CachedResponse {
    query: ViewportQuery,
    entities: Vec<Arc<Entity>>,
}

enum Completion {
    Districts(DistrictShapeIndex),
    Refresh {
        token: u64,
        snapshot: RefreshSnapshot,
        started: Instant,
        result: Result<Vec<Entity>, FetchError>,
    },
    Search {
        token: u64,
        query: String,
        result: Result<Vec<Entity>, FetchError>,
    },
    Detail {
        entity_id: String,
        as_of: AsOf,
        result: Result<Entity, FetchError>,
    },
}

pub struct ViewportSyncEngine {
    client: Arc<dyn SpatialFetchClient>,
    options: EngineOptions,
    districts: Arc<DistrictShapeIndex>,

    events: mpsc::Receiver<MapEvent>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<MapState>,
    commands: mpsc::UnboundedSender<MapCommand>,

    viewport: Option<Viewport>,
    context: QueryContext,
    focused_district: Option<String>,

    debounce: Debouncer<RefreshSnapshot>,
    refresh_seq: u64,
    in_flight: Option<(u64, RefreshSnapshot)>,
    last_response: Option<CachedResponse>,

    search: SearchIdentifyFlow,
    popup: PopupDetailLoader,
    tasks: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl ViewportSyncEngine {
    /// Spawn the engine on the current runtime.
    ///
    /// `districts` resolves to the boundary index; the map works without it
    /// and district filtering starts once it lands.
    pub fn spawn<F>(
        client: Arc<dyn SpatialFetchClient>,
        options: EngineOptions,
        context: QueryContext,
        districts: F,
    ) -> RunningEngine
    where
        F: Future<Output = DistrictShapeIndex> + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MapState {
            visible: Arc::new(VisibleSet::default()),
            generation: 0,
            tier: RenderTier::None,
            status: SyncStatus::Idle,
            context: context.clone(),
        });
        let shutdown = CancellationToken::new();

        let tasks = FuturesUnordered::new();
        tasks.push(districts.map(Completion::Districts).boxed());

        let engine = Self {
            client,
            debounce: Debouncer::new(options.debounce),
            options,
            districts: Arc::new(DistrictShapeIndex::default()),
            events: events_rx,
            shutdown: shutdown.clone(),
            state_tx,
            commands: commands_tx,
            viewport: None,
            context,
            focused_district: None,
            refresh_seq: 0,
            in_flight: None,
            last_response: None,
            search: SearchIdentifyFlow::default(),
            popup: PopupDetailLoader::default(),
            tasks,
        };

        let task = tokio::spawn(engine.run());

        RunningEngine {
            handle: EngineHandle {
                events: events_tx,
                state: state_rx,
                shutdown,
            },
            commands: commands_rx,
            task,
        }
    }

    async fn run(mut self) {
        tracing::info!(debounce_ms = self.options.debounce.as_millis() as u64, "viewport sync engine started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(done) = self.tasks.next(), if !self.tasks.is_empty() => self.on_completion(done),
                snapshot = self.debounce.fired() => self.start_refresh(snapshot),
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
            }
        }

        self.debounce.cancel();
        tracing::info!("viewport sync engine stopped");
    }

    fn on_event(&mut self, event: MapEvent) {
        tracing::trace!(?event, "map event");
        match event {
            MapEvent::ViewportChanged { viewport } => {
                self.viewport = Some(viewport);
                self.schedule_refresh();
            }
            MapEvent::AsOfChanged { as_of } => {
                if as_of == self.context.as_of {
                    return;
                }
                self.popup.retain_as_of(&as_of);
                self.context.as_of = as_of;
                self.publish_context();
                self.schedule_refresh();
            }
            MapEvent::RecordLimitChanged { record_limit } => {
                if record_limit == self.context.record_limit {
                    return;
                }
                self.context.record_limit = record_limit;
                self.publish_context();
                self.schedule_refresh();
            }
            MapEvent::DistrictSelected { district_id } => {
                if district_id == self.context.district_id {
                    return;
                }
                self.context.district_id = district_id;
                self.publish_context();
                self.focus_district();
                self.schedule_refresh();
            }
            MapEvent::Search { query } => self.start_search(&query),
            MapEvent::EntitySelected { entity_id } => self.select_entity(entity_id),
            MapEvent::MarkerMounted { entity_id } => {
                if self.search.on_marker_mounted(&entity_id) {
                    self.emit(MapCommand::OpenPopup { entity_id });
                }
            }
            MapEvent::PopupClosed { entity_id } => {
                self.search.on_popup_closed(&entity_id);
            }
        }
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Districts(index) => {
                self.districts = Arc::new(index);
                self.focus_district();
                if self.context.district_id.is_some() {
                    self.schedule_refresh();
                }
            }
            Completion::Refresh {
                token,
                snapshot,
                started,
                result,
            } => self.finish_refresh(token, snapshot, started, result),
            Completion::Search { token, query, result } => self.finish_search(token, query, result),
            Completion::Detail {
                entity_id,
                as_of,
                result,
            } => self.finish_detail(entity_id, as_of, result),
        }
    }

    fn emit(&self, command: MapCommand) {
        tracing::debug!(?command, "map command");
        // The map may have gone away; commands are fire-and-forget.
        let _ = self.commands.send(command);
    }

    fn publish_context(&self) {
        let context = self.context.clone();
        self.state_tx.send_modify(|s| s.context = context);
    }

    fn set_status(&self, status: SyncStatus) {
        self.state_tx.send_if_modified(|s| {
            if s.status == status {
                return false;
            }
            s.status = status;
            true
        });
    }

    fn replace_visible(&self, visible: VisibleSet) {
        self.state_tx.send_modify(|s| {
            s.visible = Arc::new(visible);
            s.generation += 1;
        });
    }

    fn current_visible(&self) -> Arc<VisibleSet> {
        self.state_tx.borrow().visible.clone()
    }

    // ---- viewport refresh -------------------------------------------------

    fn schedule_refresh(&mut self) {
        let Some(viewport) = self.viewport else {
            tracing::debug!("no viewport yet, refresh deferred");
            return;
        };

        let snapshot = RefreshSnapshot {
            viewport,
            context: self.context.clone(),
        };
        if self.debounce.schedule(snapshot) {
            metrics::counter!("map_refresh_coalesced_total").increment(1);
        }
    }

    fn start_refresh(&mut self, snapshot: RefreshSnapshot) {
        let tier = RenderTier::for_zoom(snapshot.viewport.zoom, &self.options.thresholds);
        self.state_tx.send_if_modified(|s| {
            let changed = s.tier != tier;
            s.tier = tier;
            changed
        });

        if matches!(&self.in_flight, Some((_, pending)) if *pending == snapshot) {
            tracing::debug!("identical refresh already in flight, skipping");
            metrics::counter!("map_refresh_deduplicated_total").increment(1);
            return;
        }

        let query = snapshot.query();
        self.refresh_seq += 1;
        let token = self.refresh_seq;

        if let Some(cached) = self.last_response.as_ref().filter(|c| c.query == query) {
            // Only local filters changed; the last response still answers it.
            metrics::counter!("map_refresh_cache_hits_total").increment(1);
            let entities = containment::apply_district(
                &self.districts,
                snapshot.context.district_id.as_deref(),
                cached.entities.clone(),
            );
            let entities = self.with_cached_details(entities, &snapshot.context.as_of);
            self.in_flight = None;
            tracing::debug!(token, visible = entities.len(), "refresh served from last response");
            // Same membership: keep the current entries, which may carry merged detail.
            let current = self.current_visible();
            if !current.iter().map(|e| &e.id).eq(entities.iter().map(|e| &e.id)) {
                self.replace_visible(VisibleSet::new(entities));
            }
            self.set_status(SyncStatus::Fresh);
            return;
        }

        metrics::counter!("map_refresh_started_total").increment(1);
        tracing::debug!(
            token,
            zoom = snapshot.viewport.zoom,
            as_of = %snapshot.context.as_of,
            record_limit = snapshot.context.record_limit,
            "viewport refresh started"
        );

        self.in_flight = Some((token, snapshot.clone()));
        self.set_status(SyncStatus::Refreshing);

        let client = self.client.clone();
        let timeout = self.options.fetch_timeout;
        let started = Instant::now();
        self.tasks.push(
            async move {
                let result = with_timeout(timeout, client.points_in_viewport(&query)).await;
                Completion::Refresh {
                    token,
                    snapshot,
                    started,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn finish_refresh(
        &mut self,
        token: u64,
        snapshot: RefreshSnapshot,
        started: Instant,
        result: Result<Vec<Entity>, FetchError>,
    ) {
        if token != self.refresh_seq {
            tracing::debug!(token, latest = self.refresh_seq, "discarding stale refresh result");
            metrics::counter!("map_refresh_stale_discarded_total").increment(1);
            return;
        }
        self.in_flight = None;
        metrics::histogram!("map_refresh_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(entities) => {
                let fetched: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
                let fetched_len = fetched.len();
                let visible = containment::apply_district(
                    &self.districts,
                    snapshot.context.district_id.as_deref(),
                    fetched.clone(),
                );
                let visible = self.with_cached_details(visible, &snapshot.context.as_of);
                self.last_response = Some(CachedResponse {
                    query: snapshot.query(),
                    entities: fetched,
                });

                tracing::info!(token, fetched = fetched_len, visible = visible.len(), "viewport refresh applied");
                self.replace_visible(VisibleSet::new(visible));
                self.set_status(SyncStatus::Fresh);
            }
            Err(e) => {
                tracing::warn!(token, error = %e, "viewport refresh failed, keeping last visible set");
                metrics::counter!("map_refresh_failed_total").increment(1);
                self.set_status(SyncStatus::Degraded { reason: e.to_string() });
            }
        }
    }

    /// Fit the camera to a newly selected district, once per selection.
    fn focus_district(&mut self) {
        let Some(district_id) = self.context.district_id.clone() else {
            self.focused_district = None;
            return;
        };
        if self.focused_district.as_deref() == Some(district_id.as_str()) {
            return;
        }

        let Some(bounds) = self.districts.lookup(&district_id).and_then(|d| d.bounds()) else {
            tracing::debug!(district_id = %district_id, "district shape not loaded, no auto-focus");
            return;
        };
        self.focused_district = Some(district_id);
        self.emit(MapCommand::FitBounds(bounds));
    }

    // ---- search -----------------------------------------------------------

    fn start_search(&mut self, raw: &str) {
        let Some(ticket) = self.search.begin(raw) else {
            return;
        };
        metrics::counter!("map_search_requests_total").increment(1);
        tracing::debug!(query = %ticket.query, token = ticket.token, "search started");

        let client = self.client.clone();
        let as_of = self.context.as_of.clone();
        self.tasks.push(
            async move {
                let result = client.identify(&ticket.query, &as_of).await;
                Completion::Search {
                    token: ticket.token,
                    query: ticket.query,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn finish_search(&mut self, token: u64, query: String, result: Result<Vec<Entity>, FetchError>) {
        if !self.search.is_current(token) {
            tracing::debug!(query = %query, "discarding superseded search result");
            return;
        }

        let candidates = match result {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "search failed");
                self.emit(MapCommand::Notice(Notice::SearchFailed {
                    query,
                    reason: e.to_string(),
                }));
                return;
            }
        };

        match SearchIdentifyFlow::resolve(candidates) {
            SearchOutcome::NoMatch => {
                tracing::info!(query = %query, "search found nothing");
                self.emit(MapCommand::Notice(Notice::NoMatch { query }));
            }
            SearchOutcome::Single(entity) => {
                tracing::info!(query = %query, entity_id = %entity.id, "search resolved to one entity");
                let point = entity.location;
                self.search.focus(&entity.id);
                self.replace_visible(self.current_visible().upsert(entity));
                self.emit(MapCommand::CenterOn {
                    point,
                    zoom: self.options.focus_zoom,
                });
            }
            SearchOutcome::Multiple { bounds, count } => {
                tracing::info!(query = %query, count, "search matched several entities");
                self.search.clear_focus();
                self.emit(MapCommand::FitBounds(bounds));
            }
        }
    }

    // ---- popup detail -----------------------------------------------------

    fn select_entity(&mut self, entity_id: String) {
        let as_of = self.context.as_of.clone();
        match self.popup.select(&entity_id, &as_of) {
            Selection::Ready(detail) => {
                self.merge_detail(detail.clone());
                self.emit(MapCommand::Popup {
                    entity_id,
                    view: PopupView::Ready(detail),
                });
            }
            Selection::AlreadyLoading => {
                self.emit(MapCommand::Popup {
                    entity_id,
                    view: PopupView::Loading,
                });
            }
            Selection::Fetch => {
                metrics::counter!("map_detail_requests_total").increment(1);
                self.emit(MapCommand::Popup {
                    entity_id: entity_id.clone(),
                    view: PopupView::Loading,
                });

                let client = self.client.clone();
                self.tasks.push(
                    async move {
                        let result = client.entity_detail(&entity_id, &as_of).await;
                        Completion::Detail {
                            entity_id,
                            as_of,
                            result,
                        }
                    }
                    .boxed(),
                );
            }
        }
    }

    fn finish_detail(&mut self, entity_id: String, as_of: AsOf, result: Result<Entity, FetchError>) {
        match self.popup.complete(&entity_id, &as_of, result) {
            Ok(detail) => {
                if as_of == self.context.as_of {
                    self.merge_detail(detail.clone());
                    self.emit(MapCommand::Popup {
                        entity_id,
                        view: PopupView::Ready(detail),
                    });
                } else {
                    tracing::debug!(entity_id = %entity_id, "detail arrived for a previous as-of, cached only");
                }
            }
            Err(e) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "detail fetch failed, popup stays loading");
                metrics::counter!("map_detail_failed_total").increment(1);
            }
        }
    }

    /// Swap in already-loaded detail records for the same point in time.
    fn with_cached_details(&self, entities: Vec<Arc<Entity>>, as_of: &AsOf) -> Vec<Arc<Entity>> {
        entities
            .into_iter()
            .map(|e| self.popup.cached(&e.id, as_of).unwrap_or(e))
            .collect()
    }

    fn merge_detail(&self, detail: Arc<Entity>) {
        let current = self.current_visible();
        if current.get(&detail.id).is_some_and(|shown| Arc::ptr_eq(shown, &detail)) {
            return;
        }
        if let Some(updated) = current.replace_existing(detail) {
            self.replace_visible(updated);
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(FetchError::Timeout(limit))),
        None => fut.await,
    }
}
