//! The GreyNoise provider.
//!
//! [`GreyNoiseProvider`] implements [`ProviderService`] on top of
//! [`GreyNoiseClient`]. It serves three resources and four data sources, all
//! prefixed with `greynoise_`:
//!
//! | Type | Kind |
//! |---|---|
//! | `greynoise_sensor_bootstrap` | resource, generates bootstrap scripts locally |
//! | `greynoise_sensor_persona` | resource, the persona deployed to a sensor |
//! | `greynoise_sensor_metadata` | resource, a sensor's name and tags |
//! | `greynoise_account` | data source |
//! | `greynoise_persona` | data source |
//! | `greynoise_personas` | data source |
//! | `greynoise_sensor` | data source |
//!
//! The client is built during [`ProviderService::configure`] and shared by
//! every callback. [`ProviderService::stop`] cancels requests still in flight;
//! a later `configure` builds a fresh client that is not cancelled.

mod data_sources;
mod plan;
mod sensor_bootstrap;
mod sensor_metadata;
mod sensor_persona;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, GreyNoiseClient, HttpTransport};
use crate::config::{ProviderConfig, API_KEY_ENV_VAR};
use crate::error::ProviderError;
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata};
use crate::validation;

pub use sensor_bootstrap::{deterministic_ssh_port, SSH_PORT_MAX, SSH_PORT_MIN};

/// Provider type name; every resource and data source type starts with it.
pub const TYPE_NAME: &str = "greynoise";

/// State shared with resources once the provider is configured.
pub(crate) struct ProviderData {
    pub(crate) client: GreyNoiseClient,
    pub(crate) api_key: String,
}

/// A managed resource type.
#[async_trait]
pub(crate) trait Resource: Send + Sync {
    /// Type name without the provider prefix.
    fn name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Checks beyond the schema's structural validation.
    fn validate_config(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    async fn create(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError>;

    async fn read(&self, data: &ProviderData, state: Value) -> Result<Value, ProviderError>;

    async fn update(
        &self,
        data: &ProviderData,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Forget the resource. Nothing is removed remotely unless a resource overrides this.
    async fn delete(&self, _data: &ProviderData, _state: Value) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Initial state for an imported resource; a read completes it.
    fn import_state(&self, id: &str) -> Value;
}

/// A read-only data source type.
#[async_trait]
pub(crate) trait DataSource: Send + Sync {
    /// Type name without the provider prefix.
    fn name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn validate_config(&self, _config: &Value) -> Vec<Diagnostic> {
        Vec::new()
    }

    async fn read(&self, data: &ProviderData, config: Value) -> Result<Value, ProviderError>;
}

/// Provider for GreyNoise sensors and personas.
pub struct GreyNoiseProvider {
    version: String,
    data: RwLock<Option<Arc<ProviderData>>>,
    /// Root of every client's cancellation token. Replaced on the first
    /// `configure` after `stop`.
    shutdown: Mutex<CancellationToken>,
    transport: Option<Arc<dyn HttpTransport>>,
    resources: BTreeMap<String, Box<dyn Resource>>,
    data_sources: BTreeMap<String, Box<dyn DataSource>>,
}

impl GreyNoiseProvider {
    /// Create an unconfigured provider reporting the given version.
    pub fn new(version: impl Into<String>) -> Self {
        let resources: Vec<Box<dyn Resource>> = vec![
            Box::new(sensor_bootstrap::SensorBootstrapResource),
            Box::new(sensor_persona::SensorPersonaResource),
            Box::new(sensor_metadata::SensorMetadataResource),
        ];
        let data_sources: Vec<Box<dyn DataSource>> = vec![
            Box::new(data_sources::AccountDataSource),
            Box::new(data_sources::PersonaDataSource),
            Box::new(data_sources::PersonasDataSource),
            Box::new(data_sources::SensorDataSource),
        ];

        Self {
            version: version.into(),
            data: RwLock::new(None),
            shutdown: Mutex::new(CancellationToken::new()),
            transport: None,
            resources: resources.into_iter().map(|r| (qualified(r.name()), r)).collect(),
            data_sources: data_sources.into_iter().map(|d| (qualified(d.name()), d)).collect(),
        }
    }

    /// Send API requests through `transport` instead of the default HTTP client.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The version reported in metadata.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The API client, once configured.
    pub async fn client(&self) -> Option<GreyNoiseClient> {
        self.data.read().await.as_ref().map(|data| data.client.clone())
    }

    fn provider_config_schema() -> Schema {
        Schema::v0()
            .with_description("Interact with the GreyNoise sensor platform.")
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "GreyNoise API key. Defaults to the `{}` environment variable.",
                        API_KEY_ENV_VAR
                    )),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description("GreyNoise API base URL."),
            )
    }

    async fn configured(&self) -> Result<Arc<ProviderData>, ProviderError> {
        self.data
            .read()
            .await
            .clone()
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    "configure must succeed before resources are used".into(),
                )
            })
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }

    fn session_token(&self) -> CancellationToken {
        let mut root = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
        if root.is_cancelled() {
            debug!("provider was stopped, starting a new session");
            *root = CancellationToken::new();
        }
        root.child_token()
    }

    async fn build_client(
        &self,
        api_key: &str,
        config: &ProviderConfig,
    ) -> Result<GreyNoiseClient, Diagnostic> {
        let mut builder = GreyNoiseClient::builder(api_key).cancellation(self.session_token());
        match config.base_url() {
            Ok(Some(url)) => builder = builder.base_url(url),
            Ok(None) => {},
            Err(err) => {
                return Err(Diagnostic::error("Error parsing GreyNoise API base URL")
                    .with_detail(format!("Error attempting to parse base URL: {}", err))
                    .with_attribute("base_url"))
            },
        }
        if let Some(transport) = &self.transport {
            builder = builder.transport(Arc::clone(transport));
        }

        let client = builder
            .build()
            .await
            .map_err(|err| client_failure(&err, "Error creating GreyNoise API client"))?;
        client
            .ping()
            .await
            .map_err(|err| client_failure(&err, "Unable to ping the GreyNoise API"))?;
        Ok(client)
    }
}

impl Default for GreyNoiseProvider {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl std::fmt::Debug for GreyNoiseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreyNoiseProvider")
            .field("version", &self.version)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderService for GreyNoiseProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(Self::provider_config_schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |schema, (name, r)| schema.with_resource(name.clone(), r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |schema, (name, d)| schema.with_data_source(name.clone(), d.schema()))
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: TYPE_NAME.to_string(),
            version: self.version.clone(),
            resources: self.resources.keys().cloned().collect(),
            data_sources: self.data_sources.keys().cloned().collect(),
        }
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&Self::provider_config_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        if let Err(err) = ProviderConfig::from_value(config)?.base_url() {
            diagnostics.push(
                Diagnostic::error("Error parsing GreyNoise API base URL")
                    .with_detail(err.to_string())
                    .with_attribute("base_url"),
            );
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;

        let Some(api_key) = config.resolve_api_key() else {
            warn!("no API key configured");
            return Ok(vec![Diagnostic::error("No API key set")
                .with_detail(format!(
                    "API key must be provided in configuration or set via environment variable: {}",
                    API_KEY_ENV_VAR
                ))
                .with_attribute("api_key")]);
        };

        let client = match self.build_client(&api_key, &config).await {
            Ok(client) => client,
            Err(diagnostic) => {
                warn!(summary = %diagnostic.summary, "provider configuration failed");
                return Ok(vec![diagnostic]);
            },
        };

        info!(workspace_id = %client.workspace_id(), "configured GreyNoise provider");
        *self.data.write().await = Some(Arc::new(ProviderData { client, api_key }));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("stopping provider, cancelling outstanding requests");
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let mut diagnostics = validation::validate(&resource.schema(), &config);
        if !has_errors(&diagnostics) {
            diagnostics.extend(resource.validate_config(&config));
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        let result = plan::plan(&resource.schema(), prior_state.as_ref(), proposed_state);
        debug!(
            changes = result.changes.len(),
            requires_replace = result.requires_replace,
            "planned"
        );
        Ok(result)
    }

    #[instrument(skip(self, planned_state))]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let data = self.configured().await?;
        let state = resource.create(&data, planned_state).await?;
        debug!("created");
        Ok(state)
    }

    #[instrument(skip(self, current_state))]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let data = self.configured().await?;
        resource.read(&data, current_state).await
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let data = self.configured().await?;
        let state = resource.update(&data, prior_state, planned_state).await?;
        debug!("updated");
        Ok(state)
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let data = self.configured().await?;
        resource.delete(&data, current_state).await
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        if id.is_empty() {
            return Err(ProviderError::Validation("import id must not be empty".into()));
        }
        Ok(vec![ImportedResource::new(resource_type, resource.import_state(id))])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let mut diagnostics = validation::validate(&data_source.schema(), &config);
        if !has_errors(&diagnostics) {
            diagnostics.extend(data_source.validate_config(&config));
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let data = self.configured().await?;
        data_source.read(&data, config).await
    }
}

fn qualified(name: &str) -> String {
    format!("{}_{}", TYPE_NAME, name)
}

fn client_failure(err: &ClientError, summary: &str) -> Diagnostic {
    if err.status_code() == Some(StatusCode::UNAUTHORIZED) {
        return Diagnostic::error("Unable to authenticate with GreyNoise API")
            .with_detail("Check your API key to ensure it is valid and unexpired.");
    }
    Diagnostic::error(summary).with_detail(err.to_string())
}

/// Decode resource state or configuration into its model.
pub(crate) fn from_state<T: DeserializeOwned>(value: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value)?)
}

/// Encode a model as resource state.
pub(crate) fn to_state<T: Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

/// Deserialize `null` as the type's default, for attributes a host may send unset.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
