//! Read-only data sources: the account, personas and sensors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{from_state, null_as_default, to_state, DataSource, ProviderData};
use crate::client::{Persona, PersonaSearchFilters, Sensor, SensorSearchFilter, SensorSortBy};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

/// `greynoise_account`: the account behind the configured API key.
pub(crate) struct AccountDataSource;

#[derive(Debug, Serialize)]
struct AccountModel {
    user_id: String,
    workspace_id: String,
}

#[async_trait]
impl DataSource for AccountDataSource {
    fn name(&self) -> &'static str {
        "account"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Information about the current account.")
            .with_attribute(
                "user_id",
                Attribute::computed_string().with_description("User ID of the account."),
            )
            .with_attribute(
                "workspace_id",
                Attribute::computed_string().with_description("Workspace ID of the account."),
            )
    }

    async fn read(&self, data: &ProviderData, _config: Value) -> Result<Value, ProviderError> {
        to_state(&AccountModel {
            user_id: data.client.user_id().to_string(),
            workspace_id: data.client.workspace_id().to_string(),
        })
    }
}

/// `greynoise_persona`: a single persona by id.
pub(crate) struct PersonaDataSource;

#[derive(Debug, Deserialize)]
struct PersonaConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    id: String,
}

#[derive(Debug, Serialize)]
struct PersonaModel {
    id: String,
    name: String,
    description: String,
    author: String,
    artifact_link: String,
    tier: String,
    categories: Vec<String>,
    application_protocols: Vec<String>,
    ports: Vec<u16>,
    operating_system: String,
    associated_vulnerabilities: Vec<String>,
}

impl From<Persona> for PersonaModel {
    fn from(persona: Persona) -> Self {
        Self {
            id: persona.id,
            name: persona.name,
            description: persona.description,
            author: persona.author,
            artifact_link: persona.artifact_link,
            tier: persona.tier,
            categories: persona.categories,
            application_protocols: persona.application_protocols,
            ports: persona.ports,
            operating_system: persona.operating_system,
            associated_vulnerabilities: persona.associated_vulnerabilities,
        }
    }
}

#[async_trait]
impl DataSource for PersonaDataSource {
    fn name(&self) -> &'static str {
        "persona"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A persona from the GreyNoise catalog.")
            .with_attribute(
                "id",
                Attribute::required_string().with_description("ID of the persona."),
            )
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("description", Attribute::computed_string())
            .with_attribute("author", Attribute::computed_string())
            .with_attribute("artifact_link", Attribute::computed_string())
            .with_attribute(
                "tier",
                Attribute::computed_string().with_description("Tier to which the persona belongs."),
            )
            .with_attribute("categories", Attribute::computed_string_list())
            .with_attribute(
                "application_protocols",
                Attribute::computed_string_list()
                    .with_description("Application protocols used by the persona."),
            )
            .with_attribute(
                "ports",
                Attribute::new(
                    AttributeType::list(AttributeType::Int64),
                    AttributeFlags::computed(),
                )
                .with_description("Ports the persona listens on."),
            )
            .with_attribute("operating_system", Attribute::computed_string())
            .with_attribute(
                "associated_vulnerabilities",
                Attribute::computed_string_list()
                    .with_description("Vulnerabilities associated with the persona."),
            )
    }

    async fn read(&self, data: &ProviderData, config: Value) -> Result<Value, ProviderError> {
        let config: PersonaConfig = from_state(config)?;
        let persona = data.client.get_persona(&config.id).await?;
        to_state(&PersonaModel::from(persona))
    }
}

/// `greynoise_personas`: ids of the personas matching a search.
pub(crate) struct PersonasDataSource;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PersonasModel {
    tier: Option<String>,
    category: Option<String>,
    protocol: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    ids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    total: u32,
}

impl PersonasModel {
    fn filters(&self) -> Result<PersonaSearchFilters, ProviderError> {
        let page_size = match self.limit {
            None => 0,
            Some(limit) => u32::try_from(limit).map_err(|_| {
                ProviderError::Validation(format!(
                    "limit must be a non-negative number, got {}",
                    limit
                ))
            })?,
        };

        Ok(PersonaSearchFilters {
            tiers: self.tier.clone().unwrap_or_default(),
            categories: self.category.clone().unwrap_or_default(),
            protocols: self.protocol.clone().unwrap_or_default(),
            search: self.search.clone().unwrap_or_default(),
            page_size,
        })
    }
}

#[async_trait]
impl DataSource for PersonasDataSource {
    fn name(&self) -> &'static str {
        "personas"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Searches the persona catalog.")
            .with_attribute(
                "tier",
                Attribute::optional_string().with_description("Tier of persona."),
            )
            .with_attribute(
                "category",
                Attribute::optional_string().with_description("Category of persona."),
            )
            .with_attribute(
                "protocol",
                Attribute::optional_string().with_description("Protocol of persona."),
            )
            .with_attribute(
                "search",
                Attribute::optional_string()
                    .with_description("Partial text search on persona name."),
            )
            .with_attribute(
                "limit",
                Attribute::optional_int64()
                    .with_description("Maximum number of personas to return."),
            )
            .with_attribute(
                "ids",
                Attribute::computed_string_list()
                    .with_description("IDs of personas that match the criteria."),
            )
            .with_attribute(
                "total",
                Attribute::computed_int64().with_description("Number of matched personas."),
            )
    }

    fn validate_config(&self, config: &Value) -> Vec<Diagnostic> {
        match config.get("limit").and_then(Value::as_i64) {
            Some(limit) if limit < 0 => vec![Diagnostic::error("Invalid limit")
                .with_detail("limit must not be negative")
                .with_attribute("limit")],
            _ => Vec::new(),
        }
    }

    async fn read(&self, data: &ProviderData, config: Value) -> Result<Value, ProviderError> {
        let mut model: PersonasModel = from_state(config)?;
        let page = data.client.search_personas(&model.filters()?).await?;

        model.ids = page.items.into_iter().map(|persona| persona.id).collect();
        model.total = page.pagination.total_items;
        to_state(&model)
    }
}

/// `greynoise_sensor`: a sensor by id, or the newest sensor matching a public IP.
pub(crate) struct SensorDataSource;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SensorLookupModel {
    id: Option<String>,
    public_ip: Option<String>,
    name: Option<String>,
    status: Option<String>,
    disabled: Option<bool>,
    persona: Option<String>,
    access_port: Option<u16>,
}

impl SensorLookupModel {
    fn fill(&mut self, sensor: Sensor) {
        self.id = Some(sensor.id);
        self.name = Some(sensor.name);
        self.status = Some(sensor.status);
        self.disabled = Some(sensor.disabled);
        self.persona = Some(sensor.persona);
        self.access_port = Some(sensor.access_port);
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[async_trait]
impl DataSource for SensorDataSource {
    fn name(&self) -> &'static str {
        "sensor"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Looks up a sensor by id or public IP.")
            .with_attribute(
                "id",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .with_description("Sensor UUID."),
            )
            .with_attribute(
                "public_ip",
                Attribute::optional_string().with_description("Sensor public IP."),
            )
            .with_attribute(
                "name",
                Attribute::computed_string().with_description("Sensor human-friendly name."),
            )
            .with_attribute(
                "status",
                Attribute::computed_string().with_description("Status of the sensor."),
            )
            .with_attribute(
                "disabled",
                Attribute::computed_bool().with_description("Whether the sensor is disabled."),
            )
            .with_attribute(
                "persona",
                Attribute::computed_string().with_description("Persona configured on the sensor."),
            )
            .with_attribute(
                "access_port",
                Attribute::computed_int64().with_description("SSH port of the sensor."),
            )
    }

    fn validate_config(&self, config: &Value) -> Vec<Diagnostic> {
        let is_set = |name: &str| {
            config
                .get(name)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.is_empty())
        };
        if is_set("id") || is_set("public_ip") {
            Vec::new()
        } else {
            vec![Diagnostic::error("Missing sensor lookup")
                .with_detail("One of id or public_ip must be set")]
        }
    }

    async fn read(&self, data: &ProviderData, config: Value) -> Result<Value, ProviderError> {
        let mut model: SensorLookupModel = from_state(config)?;

        let sensor = match (non_empty(&model.id), non_empty(&model.public_ip)) {
            (Some(id), _) => data.client.get_sensor(id).await?,
            (None, Some(ip)) => {
                let filter = SensorSearchFilter::new(ip)
                    .sorted_by(SensorSortBy::CreatedAt, true)
                    .page(0, 1);
                let page = data.client.search_sensors(&filter).await?;
                page.items
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        ProviderError::NotFound(format!("no sensor found matching IP: {}", ip))
                    })?
            },
            (None, None) => {
                return Err(ProviderError::Validation("one of id or public_ip must be set".into()));
            },
        };

        model.fill(sensor);
        to_state(&model)
    }
}
