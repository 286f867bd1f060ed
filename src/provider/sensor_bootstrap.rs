//! `greynoise_sensor_bootstrap`: shell scripts that turn a server into a sensor.
//!
//! Nothing is created remotely. The resource renders three scripts from its
//! inputs, meant to be run by provisioners on the target server:
//!
//! - `setup_script` stores the API key in `~/.greynoise.key`;
//! - `bootstrap_script` downloads and runs the workspace bootstrap script;
//! - `unbootstrap_script` deletes the sensor and removes the software.

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{from_state, null_as_default, to_state, ProviderData, Resource};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};

/// Lowest SSH port picked when none is configured.
pub const SSH_PORT_MIN: u16 = 55000;
/// Upper bound (exclusive) of the picked SSH port.
pub const SSH_PORT_MAX: u16 = 65535;

/// Pick the SSH port for a server that did not configure one.
///
/// The port is derived from the address alone, so the same server always gets
/// the same port and repeated reads do not produce a diff.
pub fn deterministic_ssh_port(ip: IpAddr) -> u16 {
    let seed = match ip {
        IpAddr::V4(v4) => u64::from(u32::from(v4)),
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            (bits >> 64) as u64 ^ bits as u64
        },
    };
    StdRng::seed_from_u64(seed).gen_range(SSH_PORT_MIN..SSH_PORT_MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SensorBootstrapModel {
    #[serde(deserialize_with = "null_as_default")]
    public_ip: String,
    internal_ip: Option<String>,
    nat: Option<bool>,
    ssh_port: Option<u16>,
    config: Option<BTreeMap<String, String>>,
    sensor_public_ips: Option<Vec<String>>,
    setup_script: Option<String>,
    bootstrap_script: Option<String>,
    unbootstrap_script: Option<String>,
    ssh_port_selected: Option<u16>,
}

/// Workspace URLs the scripts call.
struct ScriptUrls {
    bootstrap: String,
    unbootstrap: String,
    sensors: String,
}

impl SensorBootstrapModel {
    fn compute(mut self, api_key: &str, urls: &ScriptUrls) -> Result<Self, ProviderError> {
        let ips = parse_ips(&self.public_ip)?;
        let first = ips
            .first()
            .copied()
            .ok_or_else(|| ProviderError::Validation("public_ip is required".into()))?;
        let port = self.ssh_port.unwrap_or_else(|| deterministic_ssh_port(first));

        let internal_arg = self
            .internal_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .map(|ip| format!(" -i {}", ip))
            .unwrap_or_default();
        let nat_arg = if self.nat.unwrap_or(false) { " -t" } else { "" };

        self.setup_script = Some(format!("echo {} > ~/.greynoise.key", api_key));
        self.bootstrap_script = Some(format!(
            "KEY=$(cat ~/.greynoise.key) && \\\n\
             curl -H \"key: $KEY\" -L {} | sudo bash -s -- -k $KEY -p {}{} -s {}{}",
            urls.bootstrap, self.public_ip, internal_arg, port, nat_arg,
        ));
        self.unbootstrap_script = Some(format!(
            "SENSOR_ID=$(cat /opt/greynoise/sensor.id) KEY=$(cat ~/.greynoise.key) && \\\n\
             curl -H \"key: $KEY\" -X DELETE -L {}/$SENSOR_ID && \\\n\
             curl -H \"key: $KEY\" -L {} | sudo bash -s --",
            urls.sensors, urls.unbootstrap,
        ));
        self.sensor_public_ips = Some(ips.iter().map(ToString::to_string).collect());
        self.ssh_port_selected = Some(port);
        Ok(self)
    }
}

/// Parse a comma-separated list of IPs or CIDRs. A CIDR contributes its address part.
fn parse_ips(raw: &str) -> Result<Vec<IpAddr>, ProviderError> {
    raw.split(',').map(str::trim).map(parse_ip_or_cidr).collect()
}

fn parse_ip_or_cidr(raw: &str) -> Result<IpAddr, ProviderError> {
    if let Ok(ip) = raw.parse::<IpAddr>() {
        return Ok(ip);
    }

    let invalid = || {
        ProviderError::Validation(format!(
            "Error occurred while parsing IP: invalid IP or CIDR '{}'",
            raw
        ))
    };
    let (addr, prefix) = raw.split_once('/').ok_or_else(invalid)?;
    let ip: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
    if prefix > max_prefix {
        return Err(invalid());
    }
    Ok(ip)
}

pub(crate) struct SensorBootstrapResource;

impl SensorBootstrapResource {
    fn render(&self, data: &ProviderData, state: Value) -> Result<Value, ProviderError> {
        let urls = ScriptUrls {
            bootstrap: data.client.sensor_bootstrap_url()?.to_string(),
            unbootstrap: data.client.sensor_unbootstrap_url()?.to_string(),
            sensors: data.client.sensors_url()?.to_string(),
        };
        let model: SensorBootstrapModel = from_state(state)?;
        to_state(&model.compute(&data.api_key, &urls)?)
    }
}

#[async_trait]
impl Resource for SensorBootstrapResource {
    fn name(&self) -> &'static str {
        "sensor_bootstrap"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(
                "Generates the scripts that bootstrap a server into a GreyNoise sensor, \
                 for use with a `remote-exec` provisioner.",
            )
            .with_attribute(
                "public_ip",
                Attribute::required_string()
                    .with_requires_replace()
                    .with_description(
                        "Public IP(s) of the server. Comma-separated list of IPs or CIDRs is \
                         acceptable.",
                    ),
            )
            .with_attribute(
                "internal_ip",
                Attribute::optional_string().with_description("Internal IP of the server."),
            )
            .with_attribute(
                "nat",
                Attribute::optional_bool()
                    .with_description("Whether NAT is used to route traffic to the server."),
            )
            .with_attribute(
                "ssh_port",
                Attribute::optional_int64()
                    .with_description(
                        "SSH port to configure after bootstrap. A port is picked if not provided.",
                    ),
            )
            .with_attribute(
                "ssh_port_selected",
                Attribute::computed_int64()
                    .with_description(
                        "SSH port in use: `ssh_port` if set, otherwise the picked port.",
                    ),
            )
            .with_attribute(
                "config",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .with_description("Arbitrary strings for use in associated provisioners."),
            )
            .with_attribute(
                "sensor_public_ips",
                Attribute::computed_string_list().with_description("Public IP(s) of the sensor."),
            )
            .with_attribute(
                "setup_script",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("Script that sets up the server environment."),
            )
            .with_attribute(
                "bootstrap_script",
                Attribute::computed_string().with_description("Script that bootstraps the server."),
            )
            .with_attribute(
                "unbootstrap_script",
                Attribute::computed_string()
                    .with_description("Script that unbootstraps the server."),
            )
    }

    fn validate_config(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some(public_ip) = config.get("public_ip").and_then(Value::as_str) {
            if let Err(err) = parse_ips(public_ip) {
                diagnostics.push(
                    Diagnostic::error("Parsing IP(s)")
                        .with_detail(err.message())
                        .with_attribute("public_ip"),
                );
            }
        }

        if let Some(port) = config.get("ssh_port").and_then(Value::as_i64) {
            if !(1..=i64::from(u16::MAX)).contains(&port) {
                diagnostics.push(
                    Diagnostic::error("Invalid SSH port")
                        .with_detail(format!("{} is not a valid TCP port", port))
                        .with_attribute("ssh_port"),
                );
            }
        }

        diagnostics
    }

    async fn create(&self, data: &ProviderData, planned: Value) -> Result<Value, ProviderError> {
        self.render(data, planned)
    }

    async fn read(&self, data: &ProviderData, state: Value) -> Result<Value, ProviderError> {
        self.render(data, state)
    }

    async fn update(
        &self,
        data: &ProviderData,
        _prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.render(data, planned)
    }

    fn import_state(&self, id: &str) -> Value {
        json!({ "public_ip": id })
    }
}
