use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Deserialize};

use super::{
    identify_locally,
    wire::{normalize, EntityDetail, EntityList},
    FetchError, SpatialFetchClient,
};
use crate::domain::{AsOf, Entity, ViewportQuery};

/// Route layout of the metering backend. Only the paths are configurable;
/// query parameter names are fixed by the backend contract.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendRoutes {
    #[serde(default = "default_points_path")]
    pub points_path: String,
    #[serde(default = "default_detail_path")]
    pub detail_path: String,
    /// Server-side identify index. When absent, search falls back to scanning
    /// the full entity list locally.
    #[serde(default)]
    pub identify_path: Option<String>,
    #[serde(default = "default_all_entities_path")]
    pub all_entities_path: String,
}

fn default_points_path() -> String {
    "/lecturas".to_string()
}

fn default_detail_path() -> String {
    "/api/clientes".to_string()
}

fn default_all_entities_path() -> String {
    "/api/clientes".to_string()
}

impl Default for BackendRoutes {
    fn default() -> Self {
        Self {
            points_path: default_points_path(),
            detail_path: default_detail_path(),
            identify_path: None,
            all_entities_path: default_all_entities_path(),
        }
    }
}

/// [`SpatialFetchClient`] over the backend's HTTP/JSON API.
#[derive(Clone)]
pub struct HttpSpatialClient {
    http: reqwest::Client,
    base_url: String,
    routes: BackendRoutes,
}

impl HttpSpatialClient {
    pub fn new(base_url: &str, routes: BackendRoutes, request_timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(http, base_url, routes))
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, routes: BackendRoutes) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            routes,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn get_json<T>(&self, route: &'static str, url: String, params: &[(&str, String)]) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        metrics::counter!("backend_requests_total", "route" => route).increment(1);

        let resp = self.http.get(&url).query(params).send().await.map_err(|e| {
            metrics::counter!("backend_request_errors_total", "route" => route).increment(1);
            FetchError::from(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("backend_request_errors_total", "route" => route).increment(1);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.bytes().await?;
        metrics::histogram!("backend_request_seconds", "route" => route).record(started.elapsed().as_secs_f64());

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(route, error = %e, "undecodable backend response");
            FetchError::Decode(e.to_string())
        })
    }

    /// `{detail_path}/{id}` with the id escaped as a single path segment.
    fn detail_url(&self, id: &str) -> Result<String, FetchError> {
        let base = self.url(&self.routes.detail_path);
        let mut url = reqwest::Url::parse(&base).map_err(|e| FetchError::InvalidUrl(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(base.clone()))?
            .pop_if_empty()
            .push(id);
        Ok(url.into())
    }

    async fn all_entities(&self, as_of: &AsOf) -> Result<Vec<Entity>, FetchError> {
        let list: EntityList = self
            .get_json(
                "all_entities",
                self.url(&self.routes.all_entities_path),
                &[("fecha_hora", as_of.to_string())],
            )
            .await?;
        Ok(normalize(list.into_inner()))
    }
}

#[async_trait::async_trait]
impl SpatialFetchClient for HttpSpatialClient {
    async fn points_in_viewport(&self, query: &ViewportQuery) -> Result<Vec<Entity>, FetchError> {
        let sw = query.bounds.south_west;
        let ne = query.bounds.north_east;
        let params = [
            ("fecha_hora", query.as_of.to_string()),
            ("lat_min", sw.latitude().to_string()),
            ("lat_max", ne.latitude().to_string()),
            ("lon_min", sw.longitude().to_string()),
            ("lon_max", ne.longitude().to_string()),
            ("max_rows", query.record_limit.to_string()),
        ];

        let list: EntityList = self
            .get_json("points", self.url(&self.routes.points_path), &params)
            .await?;
        Ok(normalize(list.into_inner()))
    }

    async fn entity_detail(&self, id: &str, as_of: &AsOf) -> Result<Entity, FetchError> {
        let url = self.detail_url(id)?;
        let detail: EntityDetail = match self.get_json("detail", url, &[("fecha_hora", as_of.to_string())]).await {
            Err(FetchError::Status { status: 404, .. }) => return Err(FetchError::NotFound(id.to_string())),
            other => other?,
        };

        Entity::try_from(detail.into_inner()).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn identify(&self, query: &str, as_of: &AsOf) -> Result<Vec<Entity>, FetchError> {
        match &self.routes.identify_path {
            Some(path) => {
                let list: EntityList = self
                    .get_json(
                        "identify",
                        self.url(path),
                        &[("q", query.trim().to_string()), ("fecha_hora", as_of.to_string())],
                    )
                    .await?;
                Ok(normalize(list.into_inner()))
            }
            None => {
                let all = self.all_entities(as_of).await?;
                Ok(identify_locally(all, query))
            }
        }
    }
}
