//! Deployment orchestrator
//!
//! Local stages (templates, table, dedup) run in [`PreparedDeployment::prepare`]
//! and never touch the network. Remote stages run in
//! [`PreparedDeployment::run`]: devices first, then tags, strictly in order.

use std::fmt;

use errors::{DeployError, DeployResult};
use tracing::{error, info, warn};

use crate::client::ConfigApi;
use crate::config::{RunConfig, TagFailurePolicy};
use crate::context::DeploymentContext;
use crate::dedup::{unique_devices, UniqueDevice};
use crate::provision::{DeviceProvisioner, DeviceReport, TagProvisioner, TagReport};
use crate::table::{load_rows, RowRecord};
use crate::templates::TemplateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadTemplates,
    LoadTable,
    Deduplicate,
    Devices,
    Tags,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadTemplates => "load templates",
            Self::LoadTable => "load table",
            Self::Deduplicate => "deduplicate devices",
            Self::Devices => "provision devices",
            Self::Tags => "provision tags",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called when a remote stage fails
pub trait RollbackHook: Send + Sync {
    fn on_stage_failed(&self, stage: Stage, error: &DeployError);
}

/// Leaves created resources in place
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRollback;

impl RollbackHook for NoRollback {
    fn on_stage_failed(&self, stage: Stage, error: &DeployError) {
        warn!(
            "No rollback for stage '{}' ({}); the server may be partially configured",
            stage,
            error.error_code()
        );
    }
}

/// Run a local stage with start/success/failure narration
fn run_stage<T>(stage: Stage, f: impl FnOnce() -> DeployResult<T>) -> DeployResult<T> {
    info!("Stage: {}", stage);
    match f() {
        Ok(value) => {
            info!("-- {} succeeded", stage);
            Ok(value)
        },
        Err(e) => {
            error!("-- {} failed - '{}'", stage, e);
            Err(e)
        },
    }
}

fn stage_failed(stage: Stage, e: DeployError, rollback: &dyn RollbackHook) -> DeployError {
    error!("-- {} failed - '{}'", stage, e);
    rollback.on_stage_failed(stage, &e);
    e
}

/// Everything loaded and validated before the first request is sent
#[derive(Debug, Clone)]
pub struct PreparedDeployment {
    pub context: DeploymentContext,
    pub templates: TemplateStore,
    pub rows: Vec<RowRecord>,
    pub devices: Vec<UniqueDevice>,
    pub policy: TagFailurePolicy,
}

impl PreparedDeployment {
    pub fn prepare(config: &RunConfig) -> DeployResult<Self> {
        let templates = run_stage(Stage::LoadTemplates, || {
            TemplateStore::load(&config.templates_dir)
        })?;
        let rows = run_stage(Stage::LoadTable, || load_rows(&config.table_path))?;
        let devices = run_stage(Stage::Deduplicate, || Ok(unique_devices(&rows)))?;
        info!("Unique devices gathered: {}", devices.len());

        let context = DeploymentContext::from_config(config, templates.channel_name()?)?;
        Ok(Self::new(
            context,
            templates,
            rows,
            devices,
            config.tag_failure_policy,
        ))
    }

    pub fn new(
        context: DeploymentContext,
        templates: TemplateStore,
        rows: Vec<RowRecord>,
        devices: Vec<UniqueDevice>,
        policy: TagFailurePolicy,
    ) -> Self {
        Self {
            context,
            templates,
            rows,
            devices,
            policy,
        }
    }

    /// Devices that will be created
    pub fn devices_within_limit(&self) -> &[UniqueDevice] {
        let end = self.devices.len().min(self.context.device_limit);
        &self.devices[..end]
    }

    /// Devices beyond the per-channel limit
    pub fn dropped_devices(&self) -> &[UniqueDevice] {
        &self.devices[self.devices_within_limit().len()..]
    }

    /// Number of table rows belonging to `device`
    pub fn tag_rows_for(&self, device: &str) -> usize {
        self.rows.iter().filter(|row| row.device == device).count()
    }

    pub async fn run(&self, api: &dyn ConfigApi) -> DeployResult<DeployReport> {
        self.run_with_rollback(api, &NoRollback).await
    }

    pub async fn run_with_rollback(
        &self,
        api: &dyn ConfigApi,
        rollback: &dyn RollbackHook,
    ) -> DeployResult<DeployReport> {
        info!("Stage: {}", Stage::Devices);
        let devices = DeviceProvisioner::new(&self.context, &self.templates, api)
            .provision(&self.devices)
            .await
            .map_err(|e| stage_failed(Stage::Devices, e, rollback))?;

        info!("Stage: {}", Stage::Tags);
        let tags = TagProvisioner::new(&self.context, &self.templates, api, self.policy)
            .provision(&self.rows, &self.devices)
            .await
            .map_err(|e| stage_failed(Stage::Tags, e, rollback))?;

        if let Err(e) = tags.ensure_complete() {
            rollback.on_stage_failed(Stage::Tags, &e);
        }

        Ok(DeployReport {
            channel_name: self.context.channel_name.clone(),
            devices,
            tags,
        })
    }
}

/// Result of a complete run
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub channel_name: String,
    pub devices: DeviceReport,
    pub tags: TagReport,
}

impl DeployReport {
    /// Fails when the tag stage recorded per-device failures
    pub fn ensure_complete(&self) -> DeployResult<()> {
        self.tags.ensure_complete()
    }
}
