//! Tabular loader for the device/point CSV

use std::fs::File;
use std::io::Read;
use std::path::Path;

use common::{CsvFields, CsvHeaderValidator};
use errors::{parse_error, DeployResult};
use serde::Deserialize;
use tracing::{debug, warn};

pub const COL_DEVICE: &str = "Device";
pub const COL_DEVICE_IP: &str = "Device_IP";
pub const COL_TAG_NAME: &str = "TagName";
pub const COL_ADDRESS: &str = "Address";
pub const COL_DATA_TYPE: &str = "DataType";

/// One data row of the point table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RowRecord {
    #[serde(rename = "Device")]
    pub device: String,
    #[serde(rename = "Device_IP")]
    pub device_ip: String,
    #[serde(rename = "TagName")]
    pub tag_name: String,
    #[serde(rename = "Address")]
    pub tag_address: String,
    /// Remote data type code (e.g. 5 = Word, 8 = Float)
    #[serde(rename = "DataType")]
    pub data_type: i64,
}

impl CsvFields for RowRecord {
    fn field_names() -> Vec<String> {
        [COL_DEVICE, COL_DEVICE_IP, COL_TAG_NAME, COL_ADDRESS, COL_DATA_TYPE]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// Load every data row of the table at `path`, in file order
pub fn load_rows(path: &Path) -> DeployResult<Vec<RowRecord>> {
    let source = path.display().to_string();
    let file = File::open(path).map_err(|e| parse_error!(source, e))?;
    rows_from_reader(file, &source)
}

/// Parse rows from any reader; `source` names the input in error messages
pub fn rows_from_reader<R: Read>(reader: R, source: &str) -> DeployResult<Vec<RowRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| parse_error!(source, e))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let report = CsvHeaderValidator::validate_headers::<RowRecord>(&headers);
    if !report.is_valid() {
        return Err(parse_error!(
            source,
            "missing columns [{}]",
            report.missing.join(", ")
        ));
    }
    for warning in report.warnings(Path::new(source)) {
        warn!("{}", warning);
    }

    let mut rows = Vec::new();
    for (idx, result) in csv_reader.deserialize::<RowRecord>().enumerate() {
        // Header is line 1
        let line = idx + 2;
        let row = result.map_err(|e| parse_error!(source, "line {}: {}", line, e))?;
        if row.device.is_empty() {
            return Err(parse_error!(source, "line {}: empty {} value", line, COL_DEVICE));
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(parse_error!(source, "no data rows"));
    }

    debug!("Loaded {} rows from {}", rows.len(), source);
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use errors::DeployError;
    use std::fs;
    use tempfile::TempDir;

    const TABLE: &str = "\
Device,Device_IP,TagName,Address,DataType
PLC1,192.168.1.10,Temperature,400001,8
PLC1,192.168.1.10,Pressure,400003,5
PLC2,192.168.1.11,Flow,400001,8
";

    #[test]
    fn test_rows_keep_file_order_and_mapping() {
        let rows = rows_from_reader(TABLE.as_bytes(), "inline").unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            RowRecord {
                device: "PLC1".into(),
                device_ip: "192.168.1.10".into(),
                tag_name: "Temperature".into(),
                tag_address: "400001".into(),
                data_type: 8,
            }
        );
        assert_eq!(rows[1].tag_name, "Pressure");
        assert_eq!(rows[1].data_type, 5);
        assert_eq!(rows[2].device, "PLC2");
    }

    #[test]
    fn test_columns_in_any_order_with_extras() {
        let table = "\
DataType,Comment,Address,TagName,Device_IP,Device
5, spare ,40010,Level,10.0.0.9,Tank
";
        let rows = rows_from_reader(table.as_bytes(), "inline").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device, "Tank");
        assert_eq!(rows[0].tag_address, "40010");
        assert_eq!(rows[0].data_type, 5);
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        let table = "Device,Device_IP,TagName,Address\nPLC1,10.0.0.1,T,1\n";
        let err = rows_from_reader(table.as_bytes(), "inline").unwrap_err();

        assert!(matches!(err, DeployError::Parse { .. }));
        assert!(err.to_string().contains("DataType"));
    }

    #[test]
    fn test_row_length_mismatch_is_parse_error() {
        let table = "Device,Device_IP,TagName,Address,DataType\nPLC1,10.0.0.1,T,1\n";
        let err = rows_from_reader(table.as_bytes(), "inline").unwrap_err();

        assert!(matches!(err, DeployError::Parse { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_non_integer_data_type_is_parse_error() {
        let table = "Device,Device_IP,TagName,Address,DataType\nPLC1,10.0.0.1,T,1,Float\n";
        let err = rows_from_reader(table.as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, DeployError::Parse { .. }));
    }

    #[test]
    fn test_header_only_table_is_parse_error() {
        let table = "Device,Device_IP,TagName,Address,DataType\n";
        let err = rows_from_reader(table.as_bytes(), "inline").unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    #[test]
    fn test_load_rows_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("points.csv");
        fs::write(&path, TABLE).unwrap();

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows.len(), 3);

        let err = load_rows(&temp_dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, DeployError::Parse { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
