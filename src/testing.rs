//! Test support for the provider and the API client.
//!
//! [`ProviderTester`] walks a [`ProviderService`] through the same sequence of
//! callbacks a host would issue. [`MockTransport`] stands in for the network:
//! it replays queued responses and records every request, so a test can check
//! what was sent, or that nothing was.
//!
//! ```ignore
//! use greynoise_provider::testing::ProviderTester;
//! use greynoise_provider::GreyNoiseProvider;
//! use serde_json::json;
//!
//! let tester = ProviderTester::new(GreyNoiseProvider::default());
//! tester.configure(json!({"api_key": "test", "base_url": server.uri()})).await?;
//!
//! let config = json!({"sensor_id": "s1", "persona_id": "p1"});
//! let state = tester.lifecycle_create("greynoise_sensor_persona", config).await?;
//! assert_eq!(state["persona_id"], "p1");
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::client::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::error::ProviderError;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// Drives a provider the way a host does.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The provider under test.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's full schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names reported in metadata.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Data source type names reported in metadata.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Configure the provider. Error diagnostics become [`TestError::Diagnostics`].
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.configure(config).await?)
    }

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.validate_provider_config(config).await?)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(self.provider.validate_resource_config(resource_type, config).await?)
    }

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(
            self.provider
                .validate_data_source_config(data_source_type, config)
                .await?,
        )
    }

    /// Plan with no prior state. The configuration doubles as the proposal.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, config.clone(), config).await
    }

    /// Plan moving `prior` to the configuration `config`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), config.clone(), config)
            .await
    }

    /// Plan removing the resource described by `prior`.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior), Value::Null, Value::Null)
            .await
    }

    /// Refresh a resource's state.
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Import a resource by id.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Import by id, then read the first imported resource to complete its state.
    pub async fn import_and_read(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Value, ProviderError> {
        let imported = self
            .import_resource(resource_type, id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ProviderError::Internal(format!("importing '{}' produced no resources", id))
            })?;
        self.read(&imported.resource_type, imported.state).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// Plan, create, then read back. Returns the refreshed state.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let state = self.provider.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, state).await
    }

    /// Plan, update in place, then read back. Fails if the plan requires replacement.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_update(resource_type, prior.clone(), config).await?;
        if plan.requires_replace {
            return Err(ProviderError::Internal(format!(
                "plan for {} requires replacement, not an update",
                resource_type
            )));
        }
        let state = self.provider.update(resource_type, prior, plan.planned_state).await?;
        self.read(resource_type, state).await
    }

    /// Plan a delete, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, state.clone()).await?;
        self.provider.delete(resource_type, state).await
    }
}

/// Why a tester call failed.
#[derive(Debug)]
pub enum TestError {
    /// The provider answered with error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The callback itself returned an error.
    Provider(ProviderError),
}

impl TestError {
    /// The error diagnostics, empty for [`TestError::Provider`].
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Diagnostics(diagnostics) => diagnostics,
            Self::Provider(_) => &[],
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let diagnostics = match self {
            Self::Provider(err) => return write!(f, "provider error: {}", err),
            Self::Diagnostics(diagnostics) => diagnostics,
        };

        write!(f, "{} error diagnostic(s)", diagnostics.len())?;
        for diagnostic in diagnostics {
            write!(f, "\n- {}", diagnostic.summary)?;
            if let Some(attribute) = &diagnostic.attribute {
                write!(f, " [{}]", attribute)?;
            }
            if let Some(detail) = &diagnostic.detail {
                write!(f, ": {}", detail)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

fn errors_only(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    if !has_errors(&diagnostics) {
        return Ok(());
    }
    Err(TestError::Diagnostics(
        diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
    ))
}

/// An [`HttpTransport`] that replays queued responses and records requests.
///
/// Once the queue is empty every request fails with a transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// A mock with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose first response answers the account lookup made by
    /// [`GreyNoiseClient`](crate::GreyNoiseClient) construction.
    pub fn with_account(user_id: Uuid, workspace_id: Uuid) -> Self {
        Self::new().with_json(
            StatusCode::OK,
            json!({"user_id": user_id, "workspace_id": workspace_id}),
        )
    }

    /// Queue a response.
    pub fn with_response(self, response: HttpResponse) -> Self {
        self.push_response(response);
        self
    }

    /// Queue a JSON response.
    pub fn with_json(self, status: StatusCode, body: Value) -> Self {
        self.with_response(HttpResponse::new(status, body.to_string()))
    }

    /// Queue a response on a mock that is already shared with a client.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let target = format!("{} {}", request.method, request.url);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| TransportError::Other(format!("no response queued for {}", target)))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// Panics unless `plan` creates a new resource.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(plan.has_changes(), "plan has no changes, expected a create");
    assert!(!plan.requires_replace, "plan replaces, expected a create");
}

/// Panics if `plan` changes anything.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "expected an empty plan, got changes to {:?}",
        changed_paths(plan)
    );
}

/// Panics unless `plan` destroys and recreates the resource.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "expected a replacement, got in-place changes to {:?}",
        changed_paths(plan)
    );
}

/// Panics unless `plan` changes the resource without replacing it.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(plan.has_changes(), "plan has no changes, expected an update");
    assert!(
        !plan.requires_replace,
        "expected an in-place update, but {:?} forces replacement",
        plan.changes.iter().filter(|c| c.requires_replace).map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Panics unless `plan` changes the attribute at `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let paths = changed_paths(plan);
    assert!(paths.contains(&path), "'{}' is not among the changed attributes {:?}", path, paths);
}

/// Panics if any diagnostic is an error.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).map(|d| &d.summary).collect();
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Panics unless an error diagnostic's summary contains `needle`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], needle: &str) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).map(|d| &d.summary).collect();
    assert!(
        errors.iter().any(|summary| summary.contains(needle)),
        "no error mentions '{}', errors were {:?}",
        needle,
        errors
    );
}
