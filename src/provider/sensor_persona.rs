//! `greynoise_sensor_persona`: the persona deployed to a sensor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{from_state, null_as_default, to_state, ProviderData, Resource};
use crate::client::SensorUpdateRequest;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SensorPersonaModel {
    #[serde(default, deserialize_with = "null_as_default")]
    sensor_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    persona_id: String,
}

pub(crate) struct SensorPersonaResource;

impl SensorPersonaResource {
    async fn apply(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError> {
        let model: SensorPersonaModel = from_state(planned)?;
        if model.persona_id.is_empty() {
            return Err(ProviderError::Validation("persona_id is required".into()));
        }

        let request = SensorUpdateRequest::default().with_persona(model.persona_id.as_str());
        data.client.update_sensor(&model.sensor_id, &request).await?;
        debug!(
            sensor_id = %model.sensor_id,
            persona_id = %model.persona_id,
            "applied persona to sensor"
        );
        to_state(&model)
    }
}

#[async_trait]
impl Resource for SensorPersonaResource {
    fn name(&self) -> &'static str {
        "sensor_persona"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages the persona deployed to a sensor.")
            .with_attribute(
                "sensor_id",
                Attribute::required_string()
                    .with_requires_replace()
                    .with_description("UUID of the sensor."),
            )
            .with_attribute(
                "persona_id",
                Attribute::required_string().with_description("Persona to deploy to the sensor."),
            )
    }

    async fn create(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError> {
        self.apply(data, planned).await
    }

    async fn read(&self, data: &ProviderData, state: Value) -> Result<Value, ProviderError> {
        let mut model: SensorPersonaModel = from_state(state)?;
        let sensor = data.client.get_sensor(&model.sensor_id).await?;
        model.persona_id = sensor.persona;
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
        json!({ "sensor_id": id, "persona_id": null })
    }
}
