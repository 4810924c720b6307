//! Data model for the edgepoll sensor ingestion scheduler.
//!
//! This crate provides the types shared by the scheduler core
//! (edgepoll-core) and the service binary (edgepoll-service).
//!
//! # Features
//!
//! - Static sensor group and device identity types
//! - Per-group operational configuration with a validated interval
//! - Readings, upload batches, and the wire record shape
//! - Timestamp alignment modes
//!
//! # Example
//!
//! ```
//! use edgepoll_types::{Reading, UploadBatch};
//! use time::OffsetDateTime;
//!
//! let at = OffsetDateTime::from_unix_timestamp(10).unwrap();
//! let batch = UploadBatch::new("turbidity", "SiteA", at, vec![
//!     Reading::new("Sensor1", 15000, 2.48),
//! ]).unwrap();
//! assert_eq!(batch.records()[0].timestamp, "1970-01-01T00:00:10.000Z");
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    ConfigRow, DeviceIdentity, GroupConfig, Reading, SensorGroup, TelemetryRecord,
    TimestampAlignment, UploadBatch, format_timestamp,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime};

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    // --- GroupConfig tests ---

    #[test]
    fn test_group_config_rejects_zero_interval() {
        assert_eq!(GroupConfig::new(0, true), Err(ParseError::InvalidInterval(0)));
    }

    #[test]
    fn test_group_config_interval_duration() {
        let config = GroupConfig::new(300, false).unwrap();
        assert_eq!(config.interval(), std::time::Duration::from_secs(300));
        assert!(!config.enabled);
    }

    #[test]
    fn test_config_row_conversion() {
        let row = ConfigRow {
            interval_sec: 5,
            enabled: true,
        };
        let config = GroupConfig::try_from(row).unwrap();
        assert_eq!(config.interval_seconds(), 5);
        assert!(config.enabled);
    }

    #[test]
    fn test_config_row_non_positive_interval() {
        for interval_sec in [0, -1, i64::MIN] {
            let row = ConfigRow {
                interval_sec,
                enabled: true,
            };
            assert_eq!(
                GroupConfig::try_from(row),
                Err(ParseError::InvalidInterval(interval_sec))
            );
        }
    }

    #[test]
    fn test_group_config_deserialize_validates_interval() {
        let config: GroupConfig =
            serde_json::from_str(r#"{"interval_sec": 5, "enabled": true}"#).unwrap();
        assert_eq!(config, GroupConfig::new(5, true).unwrap());
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            serde_json::json!({"interval_sec": 5, "enabled": true})
        );

        let result: Result<GroupConfig, _> =
            serde_json::from_str(r#"{"interval_sec": 0, "enabled": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_row_deserialize() {
        let row: ConfigRow = serde_json::from_str(r#"{"interval_sec": 60, "enabled": false}"#).unwrap();
        assert_eq!(row.interval_sec, 60);
        assert!(!row.enabled);
    }

    // --- Batch tests ---

    #[test]
    fn test_batch_records_share_timestamp() {
        let batch = UploadBatch::new(
            "turbidity",
            "SiteA",
            at(5),
            vec![
                Reading::new("Sensor1", 14000, 2.31),
                Reading::new("Sensor2", 16000, 2.64),
            ],
        )
        .unwrap();

        let records = batch.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sensor_id, "Sensor1");
        assert_eq!(records[1].sensor_id, "Sensor2");
        assert!(records.iter().all(|r| r.timestamp == "1970-01-01T00:00:05.000Z"));
        assert!(records.iter().all(|r| r.site == "SiteA"));
        assert!(records.iter().all(|r| r.sensor_type == "turbidity"));
    }

    #[test]
    fn test_record_json_shape() {
        let batch = UploadBatch::new(
            "turbidity",
            "SiteA",
            at(0),
            vec![Reading::new("Sensor1", 15000, 2.48)],
        )
        .unwrap();
        let json = serde_json::to_value(&batch.records()[0]).unwrap();
        assert_eq!(json["sensor_id"], "Sensor1");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00.000Z");
        assert_eq!(json["raw_value"], 15000);
        assert_eq!(json["voltage"], 2.48);
        assert_eq!(json["site"], "SiteA");
        assert_eq!(json["sensor_type"], "turbidity");
    }

    #[test]
    fn test_format_timestamp_millisecond_precision() {
        let ts = at(1_700_000_000) + Duration::microseconds(123_456);
        assert_eq!(format_timestamp(ts).unwrap(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_format_timestamp_converts_to_utc() {
        let offset = time::UtcOffset::from_hms(2, 0, 0).unwrap();
        let ts = at(0).to_offset(offset);
        assert_eq!(format_timestamp(ts).unwrap(), "1970-01-01T00:00:00.000Z");
    }

    // --- Alignment mode tests ---

    #[test]
    fn test_alignment_default_is_grid() {
        assert_eq!(TimestampAlignment::default(), TimestampAlignment::GridAligned);
    }

    #[test]
    fn test_alignment_from_str() {
        assert_eq!(
            "grid-aligned".parse::<TimestampAlignment>(),
            Ok(TimestampAlignment::GridAligned)
        );
        assert_eq!(
            "Wall-Clock".parse::<TimestampAlignment>(),
            Ok(TimestampAlignment::WallClock)
        );
        assert!("hourly".parse::<TimestampAlignment>().is_err());
    }

    #[test]
    fn test_alignment_serde_names() {
        let json = serde_json::to_string(&TimestampAlignment::WallClock).unwrap();
        assert_eq!(json, "\"wall-clock\"");
        let mode: TimestampAlignment = serde_json::from_str("\"grid-aligned\"").unwrap();
        assert_eq!(mode, TimestampAlignment::GridAligned);
    }

    #[test]
    fn test_sensor_group_preserves_order() {
        let group = SensorGroup::new("pm", ["PM2", "PM1"]);
        assert_eq!(group.sensors, vec!["PM2".to_string(), "PM1".to_string()]);
        assert!(!group.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn positive_rows_always_convert(interval in 1i64..=i64::MAX, enabled: bool) {
                let config = GroupConfig::try_from(ConfigRow { interval_sec: interval, enabled }).unwrap();
                prop_assert_eq!(config.interval_seconds() as i64, interval);
                prop_assert_eq!(config.enabled, enabled);
            }

            #[test]
            fn formatted_timestamps_have_fixed_width(secs in 0i64..253_402_300_799, millis in 0i64..1000) {
                let ts = at(secs) + Duration::milliseconds(millis);
                let formatted = format_timestamp(ts).unwrap();
                prop_assert_eq!(formatted.len(), 24);
                prop_assert!(formatted.ends_with('Z'));
            }
        }
    }
}
