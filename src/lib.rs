//! GreyNoise Provider
//!
//! An infrastructure provider for the GreyNoise sensor platform, together with
//! the typed REST client it is built on.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **API client**: [`GreyNoiseClient`], a typed client for accounts, personas and sensors
//! - **Provider**: [`GreyNoiseProvider`], the resources and data sources served to a host
//! - **ProviderService trait**: The lifecycle callbacks a host drives
//!   (configure, plan, CRUD, import)
//! - **Schema types**: Types for describing provider, resource, and data source schemas
//! - **Error types**: [`ProviderError`] and [`ClientError`], both convertible to diagnostics
//! - **Logging**: Integration with `tracing` for structured logging
//! - **Testing**: [`testing::ProviderTester`] and [`testing::MockTransport`]
//!
//! # Quick Start
//!
//! ```ignore
//! use greynoise_provider::{GreyNoiseProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     greynoise_provider::init_logging();
//!
//!     let provider = GreyNoiseProvider::default();
//!     let diagnostics = provider.configure(json!({"api_key": null})).await?;
//!     assert!(diagnostics.is_empty(), "GN_API_KEY must be set");
//!
//!     let personas = provider
//!         .read_data_source("greynoise_personas", json!({"tier": "community", "limit": 5}))
//!         .await?;
//!     println!("{}", personas["ids"]);
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! The provider takes two optional attributes:
//!
//! - `api_key`: falls back to the `GN_API_KEY` environment variable
//! - `base_url`: defaults to `https://api.greynoise.io`
//!
//! Configuration resolves the caller's account and pings the API, so a bad key
//! is reported during configure rather than on the first resource operation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ClientError, GreyNoiseClient};
pub use config::{ProviderConfig, API_KEY_ENV_VAR};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::GreyNoiseProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
