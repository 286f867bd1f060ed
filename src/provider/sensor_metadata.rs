//! `greynoise_sensor_metadata`: a sensor's name and tags.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{from_state, null_as_default, to_state, ProviderData, Resource};
use crate::client::{
    ClientError, MetadataAccess, SensorMetadata, SensorMetadatum, SensorUpdateRequest,
};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SensorMetadataModel {
    #[serde(default, deserialize_with = "null_as_default")]
    sensor_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    /// `None` when the tags are not managed.
    #[serde(default)]
    metadata: Option<Vec<MetadataTag>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct MetadataTag {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    value: String,
    #[serde(default)]
    access: Option<String>,
}

impl MetadataTag {
    fn access(&self) -> Result<MetadataAccess, ClientError> {
        match self.access.as_deref() {
            None | Some("") => Ok(MetadataAccess::default()),
            Some(access) => access.parse(),
        }
    }

    fn to_datum(&self) -> Result<SensorMetadatum, ClientError> {
        Ok(SensorMetadatum {
            access: self.access()?,
            name: self.name.clone(),
            val: self.value.clone(),
        })
    }
}

impl SensorMetadataModel {
    fn update_request(&self) -> Result<SensorUpdateRequest, ProviderError> {
        if self.name.is_empty() {
            return Err(ProviderError::Validation("name is required".into()));
        }

        let mut request = SensorUpdateRequest::default().with_name(self.name.as_str());
        if let Some(tags) = &self.metadata {
            let items = tags.iter().map(MetadataTag::to_datum).collect::<Result<Vec<_>, _>>()?;
            request = request.with_metadata(SensorMetadata { items });
        }
        Ok(request)
    }

    /// Replace the managed tags with the sensor's visible tags. A tag keeps an
    /// unset access when the sensor reports the default for it.
    fn refresh_tags(&mut self, remote: &SensorMetadata) {
        let Some(managed) = &self.metadata else {
            return;
        };

        let refreshed = remote
            .items
            .iter()
            .filter(|item| item.access != MetadataAccess::Hidden)
            .map(|item| {
                let access_unset = managed.iter().any(|tag| {
                    tag.name == item.name && tag.access.as_deref().unwrap_or_default().is_empty()
                });
                MetadataTag {
                    name: item.name.clone(),
                    value: item.val.clone(),
                    access: if access_unset && item.access == MetadataAccess::default() {
                        None
                    } else {
                        Some(item.access.to_string())
                    },
                }
            })
            .collect();
        self.metadata = Some(refreshed);
    }
}

pub(crate) struct SensorMetadataResource;

impl SensorMetadataResource {
    async fn apply(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError> {
        let model: SensorMetadataModel = from_state(planned)?;
        let request = model.update_request()?;
        data.client.update_sensor(&model.sensor_id, &request).await?;
        debug!(sensor_id = %model.sensor_id, "updated sensor metadata");
        to_state(&model)
    }
}

#[async_trait]
impl Resource for SensorMetadataResource {
    fn name(&self) -> &'static str {
        "sensor_metadata"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages metadata about a sensor.")
            .with_attribute(
                "sensor_id",
                Attribute::required_string()
                    .with_requires_replace()
                    .with_description("UUID of the sensor."),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the sensor."),
            )
            .with_attribute(
                "metadata",
                Attribute::new(
                    AttributeType::list(AttributeType::object([
                        ("name", AttributeType::String),
                        ("value", AttributeType::String),
                        ("access", AttributeType::String),
                    ])),
                    AttributeFlags::optional(),
                )
                .with_description(
                    "Metadata tags for the sensor. `access` is one of `readwrite`, `readonly` \
                     (default) or `hidden`.",
                ),
            )
    }

    fn validate_config(&self, config: &Value) -> Vec<Diagnostic> {
        let Some(tags) = config.get("metadata").and_then(Value::as_array) else {
            return Vec::new();
        };

        tags.iter()
            .enumerate()
            .filter_map(|(i, tag)| {
                let access = tag.get("access").and_then(Value::as_str)?;
                let err = access.parse::<MetadataAccess>().err()?;
                Some(
                    Diagnostic::error("Invalid metadata access")
                        .with_detail(err.to_string())
                        .with_attribute(format!("metadata.{}.access", i)),
                )
            })
            .collect()
    }

    async fn create(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError> {
        self.apply(data, planned).await
    }

    async fn read(&self, data: &ProviderData, state: Value) -> Result<Value, ProviderError> {
        let mut model: SensorMetadataModel = from_state(state)?;
        let sensor = data.client.get_sensor(&model.sensor_id).await?;
        model.name = sensor.name;
        model.refresh_tags(&sensor.metadata);
        to_state(&model)
    }

    async fn update(
        &self,
        data: &ProviderData,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.apply(data, planned).await
    }

    fn import_state(&self, id: &str) -> Value {
        json!({ "sensor_id": id, "name": null, "metadata": null })
    }
}
