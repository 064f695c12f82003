//! Channel, agent and device provisioning
//!
//! Three requests in fixed order: channel, MQTT agent, one bulk device batch.
//! Any rejection aborts the stage; nothing created earlier is removed.

use errors::DeployResult;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::{item_count, ApiResponse, ConfigApi};
use crate::context::DeploymentContext;
use crate::dedup::UniqueDevice;
use crate::templates::{Template, TemplateStore, FIELD_DEVICE_ID, FIELD_NAME};

/// Sub-index appended to every device address
pub const DEVICE_ID_SUFFIX: &str = ".0";

/// Connection address for a Modbus TCP device, e.g. `<10.0.0.1>.0`
pub fn device_id_string(address: &str) -> String {
    format!("<{}>{}", address, DEVICE_ID_SUFFIX)
}

/// Hydrate one device payload per record, stopping at `limit`
pub fn build_device_batch(
    devices: &[UniqueDevice],
    template: &Template,
    limit: usize,
) -> Vec<Value> {
    devices
        .iter()
        .take(limit)
        .map(|device| {
            template.hydrate([
                (FIELD_NAME, json!(device.name)),
                (FIELD_DEVICE_ID, json!(device_id_string(&device.address))),
            ])
        })
        .collect()
}

/// Outcome of the device stage
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub channel: ApiResponse,
    pub agent: ApiResponse,
    /// Names of the devices submitted, in creation order
    pub devices: Vec<String>,
    /// Records beyond the device limit
    pub dropped: usize,
    pub response: ApiResponse,
}

pub struct DeviceProvisioner<'a> {
    ctx: &'a DeploymentContext,
    templates: &'a TemplateStore,
    api: &'a dyn ConfigApi,
}

impl<'a> DeviceProvisioner<'a> {
    pub fn new(
        ctx: &'a DeploymentContext,
        templates: &'a TemplateStore,
        api: &'a dyn ConfigApi,
    ) -> Self {
        Self {
            ctx,
            templates,
            api,
        }
    }

    /// Agent payload: the agent blueprint named after the channel
    pub fn agent_payload(&self) -> Value {
        self.templates
            .agent()
            .hydrate([(FIELD_NAME, json!(self.ctx.channel_name))])
    }

    pub async fn provision(&self, devices: &[UniqueDevice]) -> DeployResult<DeviceReport> {
        info!(
            "Creating channel '{}', MQTT agent and {} devices",
            self.ctx.channel_name,
            devices.len().min(self.ctx.device_limit)
        );

        let channel = self
            .api
            .post("channel", &self.ctx.channels_url(), &self.templates.channel().payload())
            .await?;
        info!("-- Channel '{}' created", self.ctx.channel_name);

        let agent = self
            .api
            .post("agent", &self.ctx.agents_url(), &self.agent_payload())
            .await?;
        info!("-- MQTT agent '{}' created", self.ctx.channel_name);

        let dropped = devices.len().saturating_sub(self.ctx.device_limit);
        if dropped > 0 {
            warn!(
                "{} devices exceed the limit of {} per channel and will not be created",
                dropped, self.ctx.device_limit
            );
        }

        let batch = Value::Array(build_device_batch(
            devices,
            self.templates.device(),
            self.ctx.device_limit,
        ));
        let response = self
            .api
            .post("devices", &self.ctx.devices_url(), &batch)
            .await?;
        info!("-- {} devices created", item_count(&batch));

        Ok(DeviceReport {
            channel,
            agent,
            devices: devices
                .iter()
                .take(self.ctx.device_limit)
                .map(|d| d.name.clone())
                .collect(),
            dropped,
            response,
        })
    }
}
