//! Autodeploy - bulk Modbus-to-MQTT provisioning for Kepware
//!
//! Reads a CSV point table and five JSON templates, then creates on a Kepware
//! configuration server, in order:
//! 1. one Modbus channel and one IoT Gateway MQTT agent named after it
//! 2. one device per distinct `Device` value (bounded by the per-channel limit)
//! 3. per device, its tags and the agent's IoT item references to them

pub mod client;
pub mod config;
pub mod context;
pub mod dedup;
pub mod deploy;
pub mod provision;
pub mod table;
pub mod templates;

pub use client::{ApiResponse, ConfigApi, DryRunApi, HttpConfigApi};
pub use config::{RunConfig, TagFailurePolicy};
pub use context::{Credentials, DeploymentContext};
pub use deploy::{DeployReport, NoRollback, PreparedDeployment, RollbackHook, Stage};
pub use errors::{DeployError, DeployResult};
