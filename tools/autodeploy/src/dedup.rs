//! Device deduplication

use std::collections::HashSet;

use crate::table::RowRecord;

/// First row seen for a device identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueDevice {
    pub name: String,
    /// Network address taken from the first row; later rows are ignored
    pub address: String,
}

impl From<&RowRecord> for UniqueDevice {
    fn from(row: &RowRecord) -> Self {
        Self {
            name: row.device.clone(),
            address: row.device_ip.clone(),
        }
    }
}

/// One record per distinct device identifier, in first-seen order
pub fn unique_devices(rows: &[RowRecord]) -> Vec<UniqueDevice> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.device.as_str()))
        .map(UniqueDevice::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(device: &str, ip: &str, tag: &str) -> RowRecord {
        RowRecord {
            device: device.into(),
            device_ip: ip.into(),
            tag_name: tag.into(),
            tag_address: "400001".into(),
            data_type: 8,
        }
    }

    #[test]
    fn test_two_devices_from_three_rows() {
        let rows = vec![
            row("PLC1", "10.0.0.1", "T1"),
            row("PLC2", "10.0.0.2", "T1"),
            row("PLC1", "10.0.0.1", "T2"),
        ];

        let devices = unique_devices(&rows);
        assert_eq!(
            devices,
            vec![
                UniqueDevice {
                    name: "PLC1".into(),
                    address: "10.0.0.1".into()
                },
                UniqueDevice {
                    name: "PLC2".into(),
                    address: "10.0.0.2".into()
                },
            ]
        );
    }

    #[test]
    fn test_first_address_wins() {
        let rows = vec![
            row("PLC1", "10.0.0.1", "T1"),
            row("PLC1", "10.0.0.99", "T2"),
        ];

        let devices = unique_devices(&rows);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "10.0.0.1");
    }

    #[test]
    fn test_count_and_order_match_first_appearance() {
        let names = ["C", "A", "C", "B", "A", "D", "B"];
        let rows: Vec<_> = names.iter().map(|n| row(n, "10.0.0.1", "T")).collect();

        let devices: Vec<_> = unique_devices(&rows).into_iter().map(|d| d.name).collect();
        assert_eq!(devices, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(unique_devices(&[]).is_empty());
    }
}
