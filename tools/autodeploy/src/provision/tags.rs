//! Tag and IoT item provisioning
//!
//! Per device, two bulk requests: the device's tags, then the matching IoT item
//! references on the MQTT agent. Both are sent even when a device has no tag
//! rows.

use errors::{DeployError, DeployResult};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::client::{ApiResponse, ConfigApi};
use crate::config::TagFailurePolicy;
use crate::context::DeploymentContext;
use crate::dedup::UniqueDevice;
use crate::table::RowRecord;
use crate::templates::{
    Template, TemplateStore, FIELD_IOT_ITEM_SERVER_TAG, FIELD_NAME, FIELD_TAG_ADDRESS,
    FIELD_TAG_DATA_TYPE,
};

/// Fully qualified server tag: `channel.device.tag`
pub fn server_tag_reference(channel: &str, device: &str, tag: &str) -> String {
    format!("{}.{}.{}", channel, device, tag)
}

/// Payloads for one device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTagBatch {
    pub device: String,
    pub tags: Vec<Value>,
    pub items: Vec<Value>,
}

/// Collect the rows of `device` in table order and hydrate tag and item payloads
pub fn build_tag_batch(
    rows: &[RowRecord],
    device: &str,
    channel: &str,
    tag_template: &Template,
    item_template: &Template,
) -> DeviceTagBatch {
    let (tags, items) = rows
        .iter()
        .filter(|row| row.device == device)
        .map(|row| {
            let tag = tag_template.hydrate([
                (FIELD_TAG_ADDRESS, json!(row.tag_address)),
                (FIELD_TAG_DATA_TYPE, json!(row.data_type)),
                (FIELD_NAME, json!(row.tag_name)),
            ]);
            let item = item_template.hydrate([(
                FIELD_IOT_ITEM_SERVER_TAG,
                json!(server_tag_reference(channel, device, &row.tag_name)),
            )]);
            (tag, item)
        })
        .unzip();

    DeviceTagBatch {
        device: device.to_string(),
        tags,
        items,
    }
}

/// Result of one device's submissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTagOutcome {
    pub device: String,
    pub tag_count: usize,
    /// First error raised for this device, if any
    pub error: Option<String>,
}

impl DeviceTagOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of the tag stage
#[derive(Debug, Clone, Default)]
pub struct TagReport {
    pub devices: Vec<DeviceTagOutcome>,
    /// Tag and item responses of the last device processed; `None` when
    /// that device failed
    pub last: Option<(ApiResponse, ApiResponse)>,
}

impl TagReport {
    pub fn failed(&self) -> usize {
        self.devices.iter().filter(|d| !d.succeeded()).count()
    }

    pub fn tag_count(&self) -> usize {
        self.devices.iter().map(|d| d.tag_count).sum()
    }

    /// `TagStageIncomplete` when any device failed under best-effort
    pub fn ensure_complete(&self) -> DeployResult<()> {
        match self.failed() {
            0 => Ok(()),
            failed => Err(DeployError::TagStageIncomplete {
                failed,
                attempted: self.devices.len(),
            }),
        }
    }
}

pub struct TagProvisioner<'a> {
    ctx: &'a DeploymentContext,
    templates: &'a TemplateStore,
    api: &'a dyn ConfigApi,
    policy: TagFailurePolicy,
}

impl<'a> TagProvisioner<'a> {
    pub fn new(
        ctx: &'a DeploymentContext,
        templates: &'a TemplateStore,
        api: &'a dyn ConfigApi,
        policy: TagFailurePolicy,
    ) -> Self {
        Self {
            ctx,
            templates,
            api,
            policy,
        }
    }

    pub fn batch_for(&self, rows: &[RowRecord], device: &str) -> DeviceTagBatch {
        build_tag_batch(
            rows,
            device,
            &self.ctx.channel_name,
            self.templates.tag(),
            self.templates.agent_item(),
        )
    }

    /// Provision tags for each device in order, up to the device limit
    ///
    /// Under [`TagFailurePolicy::FailFast`] the first rejected request is
    /// returned. Under [`TagFailurePolicy::BestEffort`] failures are recorded in
    /// the report and the next device is processed.
    pub async fn provision(
        &self,
        rows: &[RowRecord],
        devices: &[UniqueDevice],
    ) -> DeployResult<TagReport> {
        info!(
            "Creating device tags and IoT item references ({})",
            self.policy
        );

        let mut report = TagReport::default();
        for device in devices.iter().take(self.ctx.device_limit) {
            let batch = self.batch_for(rows, &device.name);
            let tag_count = batch.tags.len();

            match self.submit(batch).await {
                Ok(responses) => {
                    debug!("Device '{}': {} tags created", device.name, tag_count);
                    report.devices.push(DeviceTagOutcome {
                        device: device.name.clone(),
                        tag_count,
                        error: None,
                    });
                    report.last = Some(responses);
                },
                Err(e) => {
                    error!("-- Tags for device '{}' failed - '{}'", device.name, e);
                    if self.policy == TagFailurePolicy::FailFast {
                        return Err(e);
                    }
                    report.devices.push(DeviceTagOutcome {
                        device: device.name.clone(),
                        tag_count,
                        error: Some(e.to_string()),
                    });
                    report.last = None;
                },
            }
        }

        info!(
            "-- {} tags created across {} devices ({} failed)",
            report.tag_count(),
            report.devices.len(),
            report.failed()
        );
        Ok(report)
    }

    async fn submit(&self, batch: DeviceTagBatch) -> DeployResult<(ApiResponse, ApiResponse)> {
        let tags_url = self.ctx.tags_url(&batch.device);
        let items_url = self.ctx.iot_items_url();
        let tags = Value::Array(batch.tags);
        let items = Value::Array(batch.items);

        match self.policy {
            TagFailurePolicy::FailFast => {
                let tag_response = self.api.post("tags", &tags_url, &tags).await?;
                let item_response = self.api.post("iot_items", &items_url, &items).await?;
                Ok((tag_response, item_response))
            },
            // Items are still sent when the tag request fails
            TagFailurePolicy::BestEffort => {
                let tag_response = self.api.post("tags", &tags_url, &tags).await;
                let item_response = self.api.post("iot_items", &items_url, &items).await;
                Ok((tag_response?, item_response?))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::client::testing::ScriptedApi;
    use crate::context::Credentials;
    use crate::templates::tests::sample_store;

    fn row(device: &str, tag: &str, address: &str, data_type: i64) -> RowRecord {
        RowRecord {
            device: device.into(),
            device_ip: "10.0.0.1".into(),
            tag_name: tag.into(),
            tag_address: address.into(),
            data_type,
        }
    }

    fn device(name: &str) -> UniqueDevice {
        UniqueDevice {
            name: name.into(),
            address: "10.0.0.1".into(),
        }
    }

    fn context(limit: usize) -> DeploymentContext {
        DeploymentContext::new(
            "http",
            "127.0.0.1",
            57412,
            Credentials::new("Administrator", "pw"),
            limit,
            "ModbusTCP",
        )
        .unwrap()
    }

    fn rows() -> Vec<RowRecord> {
        vec![
            row("PLC1", "Temperature", "400001", 8),
            row("PLC2", "Flow", "400001", 8),
            row("PLC1", "Pressure", "400003", 5),
        ]
    }

    #[test]
    fn test_server_tag_reference() {
        assert_eq!(
            server_tag_reference("ModbusTCP", "PLC1", "Temperature"),
            "ModbusTCP.PLC1.Temperature"
        );
    }

    #[test]
    fn test_batch_keeps_row_order_without_leakage() {
        let store = sample_store();
        let batch = build_tag_batch(&rows(), "PLC1", "ModbusTCP", store.tag(), store.agent_item());

        assert_eq!(batch.tags.len(), 2);
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.tags[0][FIELD_NAME], "Temperature");
        assert_eq!(batch.tags[1][FIELD_NAME], "Pressure");
        assert_eq!(
            batch.items[1][FIELD_IOT_ITEM_SERVER_TAG],
            "ModbusTCP.PLC1.Pressure"
        );
        assert!(batch.tags.iter().all(|t| t[FIELD_NAME] != "Flow"));
        // Untouched blueprint fields carried over
        assert_eq!(batch.tags[0]["servermain.TAG_READ_WRITE_ACCESS"], 1);
        assert_eq!(batch.items[0]["iot_gateway.IOT_ITEM_ENABLED"], true);
    }

    #[test]
    fn test_data_type_passes_through_as_integer() {
        let store = sample_store();
        let batch = build_tag_batch(&rows(), "PLC1", "ModbusTCP", store.tag(), store.agent_item());

        assert_eq!(batch.tags[0][FIELD_TAG_DATA_TYPE], json!(8));
        assert_eq!(batch.tags[1][FIELD_TAG_DATA_TYPE], json!(5));
        assert!(batch.tags[1][FIELD_TAG_DATA_TYPE].is_i64());
        assert_eq!(batch.tags[1][FIELD_TAG_ADDRESS], "400003");
    }

    #[tokio::test]
    async fn test_two_requests_per_device_in_order() {
        let store = sample_store();
        let ctx = context(128);
        let api = ScriptedApi::new();

        let report = TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::FailFast)
            .provision(&rows(), &[device("PLC1"), device("PLC2")])
            .await
            .unwrap();

        assert_eq!(
            api.paths(),
            vec![
                "/config/v1/project/channels/ModbusTCP/devices/PLC1/tags/",
                "/config/v1/project/_iot_gateway/mqtt_clients/ModbusTCP/iot_items/",
                "/config/v1/project/channels/ModbusTCP/devices/PLC2/tags/",
                "/config/v1/project/_iot_gateway/mqtt_clients/ModbusTCP/iot_items/",
            ]
        );
        assert_eq!(report.tag_count(), 3);
        assert!(report.last.is_some());
        report.ensure_complete().unwrap();
    }

    #[tokio::test]
    async fn test_device_without_rows_still_submits_empty_batches() {
        let store = sample_store();
        let ctx = context(128);
        let api = ScriptedApi::new();

        TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::FailFast)
            .provision(&rows(), &[device("Spare")])
            .await
            .unwrap();

        let requests = api.recorder.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, json!([]));
        assert_eq!(requests[1].body, json!([]));
    }

    #[tokio::test]
    async fn test_device_limit_bounds_tag_stage() {
        let store = sample_store();
        let ctx = context(1);
        let api = ScriptedApi::new();

        let report = TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::FailFast)
            .provision(&rows(), &[device("PLC1"), device("PLC2")])
            .await
            .unwrap();

        assert_eq!(report.devices.len(), 1);
        assert_eq!(api.paths().len(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_rejection() {
        let store = sample_store();
        let ctx = context(128);
        let api = ScriptedApi::new().reject("/PLC1/tags/", 400);

        let err = TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::FailFast)
            .provision(&rows(), &[device("PLC1"), device("PLC2")])
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::RemoteRequest { status: 400, .. }));
        assert_eq!(api.paths().len(), 1);
    }

    #[tokio::test]
    async fn test_best_effort_continues_and_reports() {
        let store = sample_store();
        let ctx = context(128);
        let api = ScriptedApi::new().reject("/PLC1/tags/", 400);

        let report = TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::BestEffort)
            .provision(&rows(), &[device("PLC1"), device("PLC2")])
            .await
            .unwrap();

        assert_eq!(api.paths().len(), 4);
        assert_eq!(report.failed(), 1);
        assert!(!report.devices[0].succeeded());
        assert!(report.devices[1].succeeded());

        let err = report.ensure_complete().unwrap_err();
        assert!(matches!(
            err,
            DeployError::TagStageIncomplete {
                failed: 1,
                attempted: 2
            }
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_best_effort_last_device_rejected_clears_last() {
        let store = sample_store();
        let ctx = context(128);
        let api = ScriptedApi::new().reject("/PLC2/tags/", 400);

        let report = TagProvisioner::new(&ctx, &store, &api, TagFailurePolicy::BestEffort)
            .provision(&rows(), &[device("PLC1"), device("PLC2")])
            .await
            .unwrap();

        assert!(report.devices[0].succeeded());
        assert!(!report.devices[1].succeeded());
        assert!(report.last.is_none());
    }
}
