//! Remote provisioning stages

pub mod devices;
pub mod tags;

pub use devices::{DeviceProvisioner, DeviceReport};
pub use tags::{DeviceTagOutcome, TagProvisioner, TagReport};
