//! Typed client for the GreyNoise REST API.
//!
//! The client is constructed with an API key and immediately resolves the
//! caller's [`Account`]. Construction fails if that lookup fails, so a
//! [`GreyNoiseClient`] value always carries a validated key and a workspace.
//!
//! ```ignore
//! use greynoise_provider::client::{GreyNoiseClient, SensorSearchFilter};
//!
//! let client = GreyNoiseClient::builder("my-api-key").build().await?;
//! let page = client.search_sensors(&SensorSearchFilter::new("159.223.200.217")).await?;
//! ```
//!
//! Every operation validates its input locally before any request is sent.
//! Retries are handled by the [`HttpTransport`]; see [`RetryingTransport`].

mod error;
mod models;
pub mod transport;

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

pub use error::ClientError;
pub use models::{
    Account, MetadataAccess, Pagination, Persona, PersonaSearchFilters, PersonaSearchResponse,
    SearchResponse, Sensor, SensorMetadata, SensorMetadatum, SensorSearchFilter,
    SensorSearchResponse, SensorSortBy, SensorUpdateRequest, DEFAULT_PAGE_SIZE,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RetryingTransport, TransportError};

/// Name of the header carrying the API key.
pub const HEADER_KEY: &str = "key";

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.greynoise.io";

/// Client for the GreyNoise API.
///
/// Cloning is cheap; clones share the transport and the resolved account.
#[derive(Clone)]
pub struct GreyNoiseClient {
    base_url: Url,
    api_key: String,
    account: Account,
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for GreyNoiseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreyNoiseClient")
            .field("base_url", &self.base_url.as_str())
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Builder for [`GreyNoiseClient`].
pub struct ClientBuilder {
    api_key: String,
    base_url: Option<Url>,
    transport: Option<Arc<dyn HttpTransport>>,
    cancel: Option<CancellationToken>,
}

impl ClientBuilder {
    /// Override the API base URL.
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Use a custom transport instead of [`RetryingTransport`].
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Abort every request made by the client once `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the client and resolve the account behind the API key.
    pub async fn build(self) -> Result<GreyNoiseClient, ClientError> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL)?,
        };
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(RetryingTransport::new()?),
        };

        let mut client = GreyNoiseClient {
            base_url,
            api_key: self.api_key,
            account: Account {
                user_id: Uuid::nil(),
                workspace_id: Uuid::nil(),
            },
            transport,
            cancel: self.cancel.unwrap_or_default(),
        };
        client.account = client.fetch_account().await?;
        debug!(workspace_id = %client.account.workspace_id, "resolved GreyNoise account");
        Ok(client)
    }
}

impl GreyNoiseClient {
    /// Start building a client for the given API key.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            api_key: api_key.into(),
            base_url: None,
            transport: None,
            cancel: None,
        }
    }

    /// A clone of this client whose requests are aborted when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// The account resolved at construction.
    pub fn account(&self) -> Account {
        self.account
    }

    /// Workspace all sensor endpoints are scoped to.
    pub fn workspace_id(&self) -> Uuid {
        self.account.workspace_id
    }

    /// User behind the API key.
    pub fn user_id(&self) -> Uuid {
        self.account.user_id
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the API is reachable and accepts the key.
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), ClientError> {
        let url = self.url(&["ping"])?;
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, false)
    }

    /// Fetch a single persona.
    #[instrument(skip(self))]
    pub async fn get_persona(&self, id: &str) -> Result<Persona, ClientError> {
        check_id(id)?;

        let url = self.url(&["v1", "personas", id])?;
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, true)?;
        decode(&response)
    }

    /// Search the persona catalog within the caller's workspace.
    #[instrument(skip(self))]
    pub async fn search_personas(
        &self,
        filters: &PersonaSearchFilters,
    ) -> Result<PersonaSearchResponse, ClientError> {
        let pairs = filters.query_pairs(self.workspace_id())?;

        let url = with_query(self.url(&["v1", "personas"])?, pairs);
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, false)?;
        decode(&response)
    }

    /// Fetch a single sensor from the caller's workspace.
    #[instrument(skip(self))]
    pub async fn get_sensor(&self, id: &str) -> Result<Sensor, ClientError> {
        check_id(id)?;

        let url = self.sensors_url_with(&[id])?;
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, true)?;
        decode(&response)
    }

    /// Search sensors in the caller's workspace.
    #[instrument(skip(self))]
    pub async fn search_sensors(
        &self,
        filter: &SensorSearchFilter,
    ) -> Result<SensorSearchResponse, ClientError> {
        let pairs = filter.query_pairs()?;

        let url = with_query(self.sensors_url()?, pairs);
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, true)?;
        decode(&response)
    }

    /// Apply a partial update to a sensor. The API answers `202 Accepted`.
    #[instrument(skip(self, request))]
    pub async fn update_sensor(
        &self,
        id: &str,
        request: &SensorUpdateRequest,
    ) -> Result<(), ClientError> {
        check_id(id)?;
        if request.is_empty() {
            return Err(ClientError::MissingField("name, persona or metadata"));
        }

        let body = serde_json::to_vec(request)?;
        let url = self.sensors_url_with(&[id])?;
        let response = self.execute(Method::PUT, url, Some(body)).await?;
        expect_status(&response, StatusCode::ACCEPTED, true)
    }

    /// URL of the script that bootstraps a server into a sensor.
    pub fn sensor_bootstrap_url(&self) -> Result<Url, ClientError> {
        self.sensors_url_with(&["bootstrap", "script"])
    }

    /// URL of the script that removes the sensor software from a server.
    pub fn sensor_unbootstrap_url(&self) -> Result<Url, ClientError> {
        self.sensors_url_with(&["unbootstrap", "script"])
    }

    /// URL of the workspace's sensor collection.
    pub fn sensors_url(&self) -> Result<Url, ClientError> {
        self.sensors_url_with(&[])
    }

    async fn fetch_account(&self) -> Result<Account, ClientError> {
        let url = self.url(&["v1", "account"])?;
        let response = self.execute(Method::GET, url, None).await?;
        expect_status(&response, StatusCode::OK, false)?;
        decode(&response)
    }

    fn sensors_url_with(&self, tail: &[&str]) -> Result<Url, ClientError> {
        let workspace = self.workspace_id().to_string();
        let mut segments = vec!["v1", "workspaces", workspace.as_str(), "sensors"];
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    /// Each segment is percent-encoded on its own, so `/`, `?` and `#` in a
    /// caller-supplied id stay inside that segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ClientError::invalid_field("base_url", "cannot be a base"))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    fn headers(&self) -> Result<HeaderMap, ClientError> {
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ClientError::invalid_field("api_key", "not a valid header value"))?;

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KEY, key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, ClientError> {
        let request = HttpRequest {
            method,
            url,
            headers: self.headers()?,
            body,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.transport.send(request) => Ok(result?),
        }
    }
}

fn with_query(mut url: Url, mut pairs: Vec<(&'static str, String)>) -> Url {
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    url.query_pairs_mut()
        .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
    url
}

fn check_id(id: &str) -> Result<(), ClientError> {
    match id {
        "" => Err(ClientError::MissingField("id")),
        "." | ".." => Err(ClientError::invalid_field("id", "must not be a relative path")),
        _ => Ok(()),
    }
}

fn expect_status(
    response: &HttpResponse,
    expected: StatusCode,
    not_found_is_distinct: bool,
) -> Result<(), ClientError> {
    if response.status == expected {
        return Ok(());
    }
    if not_found_is_distinct && response.status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }
    Err(ClientError::unexpected_status(expected, response.status))
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClientError> {
    Ok(serde_json::from_slice(&response.body)?)
}
