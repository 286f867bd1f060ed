//! Request and response types for the GreyNoise API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::error::ClientError;

/// Page size used by searches when the caller leaves it at zero.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Identity of the caller, resolved from the API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// ID of the authenticated user.
    pub user_id: Uuid,
    /// Workspace every sensor call is scoped to.
    pub workspace_id: Uuid,
}

/// Pagination echoed back by search endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
    /// Requested page size.
    #[serde(default)]
    pub page_size: u32,
    /// Number of items matching the search across all pages.
    #[serde(default)]
    pub total_items: u32,
}

/// Envelope returned by search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse<T> {
    /// Items on this page.
    #[serde(default, deserialize_with = "null_as_default", bound(deserialize = "T: Deserialize<'de>"))]
    pub items: Vec<T>,
    /// Pagination for the search.
    #[serde(default)]
    pub pagination: Pagination,
}

/// Page of personas.
pub type PersonaSearchResponse = SearchResponse<Persona>;

/// Page of sensors.
pub type SensorSearchResponse = SearchResponse<Sensor>;

/// A deployable honeypot profile from the persona catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(deserialize_with = "null_as_default")]
    pub artifact_link: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tier: String,
    #[serde(deserialize_with = "null_as_default")]
    pub instance_management: String,
    #[serde(deserialize_with = "null_as_default")]
    pub workspace: String,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub operating_system: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(deserialize_with = "null_as_default")]
    pub application_protocols: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub ports: Vec<u16>,
    #[serde(deserialize_with = "null_as_default")]
    pub associated_vulnerabilities: Vec<String>,
}

/// A deployed monitoring node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensor {
    #[serde(rename = "sensor_id", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub public_ips: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub access_port: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub persona: String,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: SensorMetadata,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub disabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Key/value tags attached to a sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<SensorMetadatum>,
}

/// A single sensor tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorMetadatum {
    #[serde(deserialize_with = "null_as_default")]
    pub access: MetadataAccess,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub val: String,
}

/// Who may see and modify a sensor tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataAccess {
    /// Readable and modifiable by users.
    #[serde(rename = "readwrite")]
    ReadWrite,
    /// Readable, not modifiable by users.
    #[default]
    Readonly,
    /// Not shown to users.
    Hidden,
}

impl MetadataAccess {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadWrite => "readwrite",
            Self::Readonly => "readonly",
            Self::Hidden => "hidden",
        }
    }
}

impl fmt::Display for MetadataAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataAccess {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readwrite" => Ok(Self::ReadWrite),
            "readonly" => Ok(Self::Readonly),
            "hidden" => Ok(Self::Hidden),
            other => Err(ClientError::invalid_field(
                "access",
                format!("unknown value '{}'", other),
            )),
        }
    }
}

/// Partial sensor update. Fields left as `None` are omitted from the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensorUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SensorMetadata>,
}

impl SensorUpdateRequest {
    /// Rename the sensor.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Deploy a different persona to the sensor.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Replace the sensor's tags.
    pub fn with_metadata(mut self, metadata: SensorMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.name.is_none() && self.persona.is_none() && self.metadata.is_none()
    }
}

/// Column a sensor search can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorSortBy {
    Name,
    PublicIps,
    AccessPort,
    PersonaName,
    CreatedAt,
    Status,
}

impl SensorSortBy {
    /// Every accepted sort key.
    pub const ALL: [SensorSortBy; 6] = [
        Self::Name,
        Self::PublicIps,
        Self::AccessPort,
        Self::PersonaName,
        Self::CreatedAt,
        Self::Status,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PublicIps => "public_ips",
            Self::AccessPort => "access_port",
            Self::PersonaName => "persona_name",
            Self::CreatedAt => "created_at",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for SensorSortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorSortBy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ClientError::invalid_field("sort_by", "unknown"))
    }
}

/// Query parameters for `GET /v1/personas`.
///
/// The workspace is not part of the filter: the client always scopes persona
/// searches to the authenticated account's workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaSearchFilters {
    pub tiers: String,
    pub categories: String,
    pub protocols: String,
    pub search: String,
    /// Zero selects [`DEFAULT_PAGE_SIZE`].
    pub page_size: u32,
}

impl PersonaSearchFilters {
    /// Flatten into query pairs for the given workspace, omitting empty strings.
    pub fn query_pairs(&self, workspace: Uuid) -> Result<Vec<(&'static str, String)>, ClientError> {
        if workspace.is_nil() {
            return Err(ClientError::MissingField("workspace"));
        }

        let mut pairs = Vec::with_capacity(6);
        push_non_empty(&mut pairs, "workspace", workspace.to_string());
        push_non_empty(&mut pairs, "tiers", &self.tiers);
        push_non_empty(&mut pairs, "categories", &self.categories);
        push_non_empty(&mut pairs, "protocols", &self.protocols);
        push_non_empty(&mut pairs, "search", &self.search);
        pairs.push(("page_size", page_size_or_default(self.page_size).to_string()));
        Ok(pairs)
    }
}

/// Query parameters for `GET /v1/workspaces/{workspace}/sensors`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSearchFilter {
    /// Free-text filter (name, IP, ...). Required.
    pub filter: String,
    pub page: u32,
    /// Zero selects [`DEFAULT_PAGE_SIZE`].
    pub page_size: u32,
    /// One of [`SensorSortBy`]; empty selects `created_at`.
    pub sort_by: String,
    pub descending: bool,
}

impl SensorSearchFilter {
    /// Filter on the given text with default paging and ordering.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// Order results by the given column.
    pub fn sorted_by(mut self, sort_by: SensorSortBy, descending: bool) -> Self {
        self.sort_by = sort_by.as_str().to_string();
        self.descending = descending;
        self
    }

    /// Select a page.
    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Check the sort key and required filter.
    pub fn validate(&self) -> Result<SensorSortBy, ClientError> {
        let sort_by = if self.sort_by.is_empty() {
            SensorSortBy::CreatedAt
        } else {
            self.sort_by.parse()?
        };

        if self.filter.is_empty() {
            return Err(ClientError::MissingField("filter"));
        }

        Ok(sort_by)
    }

    /// Validate and flatten into query pairs, omitting empty strings.
    pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>, ClientError> {
        let sort_by = self.validate()?;

        let mut pairs = Vec::with_capacity(5);
        push_non_empty(&mut pairs, "filter", &self.filter);
        pairs.push(("page", self.page.to_string()));
        pairs.push(("page_size", page_size_or_default(self.page_size).to_string()));
        pairs.push(("sort_by", sort_by.as_str().to_string()));
        pairs.push(("descending", self.descending.to_string()));
        Ok(pairs)
    }
}

fn push_non_empty(
    pairs: &mut Vec<(&'static str, String)>,
    key: &'static str,
    value: impl AsRef<str>,
) {
    let value = value.as_ref();
    if !value.is_empty() {
        pairs.push((key, value.to_string()));
    }
}

fn page_size_or_default(page_size: u32) -> u32 {
    if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
