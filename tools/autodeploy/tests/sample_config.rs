//! The shipped sample setup must load and plan cleanly

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use autodeploy::{DryRunApi, PreparedDeployment, RunConfig, TagFailurePolicy};
use std::path::PathBuf;

fn sample_setup() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/setup.example.json")
}

#[test]
fn test_sample_setup_prepares() {
    let config = RunConfig::load(&sample_setup()).unwrap();
    assert_eq!(config.port, 57412);
    assert_eq!(config.tag_failure_policy, TagFailurePolicy::FailFast);

    let prepared = PreparedDeployment::prepare(&config).unwrap();
    assert_eq!(prepared.context.channel_name, "ModbusTCP");
    let names: Vec<_> = prepared.devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Boiler1", "Pump1", "Meter1"]);
    assert_eq!(prepared.tag_rows_for("Boiler1"), 3);
}

#[tokio::test]
async fn test_sample_plan_request_count() {
    let config = RunConfig::load(&sample_setup()).unwrap();
    let prepared = PreparedDeployment::prepare(&config).unwrap();
    let api = DryRunApi::new();

    prepared.run(&api).await.unwrap();

    let requests = api.requests();
    assert_eq!(requests.len(), 3 + 2 * 3);
    assert!(requests.iter().all(|r| !r.url.contains('@')));
    assert_eq!(
        requests[1].body["common.ALLTYPES_NAME"],
        requests[0].body["common.ALLTYPES_NAME"]
    );
}
