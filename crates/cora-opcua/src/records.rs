// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Machine data records populated by the [`ObjectMapper`](crate::mapper::ObjectMapper).
//!
//! Each record declares the PLC property names it understands in a static
//! field table and assigns decoded values by name. Field names match the
//! display names the controller exposes, compared case-insensitively.

use serde::Serialize;

use crate::client::transport::OpcUaValue;
use crate::error::ConversionError;
use crate::timestamp::LocalTimestamp;

// =============================================================================
// Field tables
// =============================================================================

/// How a field is read from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain Value attribute read.
    Value,
    /// A date/time assembled from indexed integer children.
    Timestamps,
}

/// One entry of a record's field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// PLC property name.
    pub name: &'static str,
    /// Read strategy.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// A value field.
    pub const fn value(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Value,
        }
    }

    /// A timestamp field.
    pub const fn timestamps(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Timestamps,
        }
    }
}

/// A decoded value ready for assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Result of a Value read.
    Value(OpcUaValue),
    /// Result of a timestamp parts read.
    Timestamps(Vec<LocalTimestamp>),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Value(v) => v.type_name(),
            Self::Timestamps(_) => "Timestamps",
        }
    }
}

/// A record the mapper can populate.
pub trait Record: Default + Send {
    /// Record name for logging.
    const NAME: &'static str;

    /// Known PLC properties.
    const FIELDS: &'static [FieldDescriptor];

    /// Assigns `value` to the field named `field` (one of [`Self::FIELDS`]).
    ///
    /// A type mismatch leaves the field untouched and returns an error.
    fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError>;

    /// Looks a property name up in the field table, ignoring case.
    fn field(name: &str) -> Option<&'static FieldDescriptor> {
        Self::FIELDS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

// =============================================================================
// Assignment helpers
// =============================================================================

fn set_i32(slot: &mut i32, value: FieldValue) -> Result<(), ConversionError> {
    match &value {
        FieldValue::Value(v) => match v.as_i32() {
            Some(n) => {
                *slot = n;
                Ok(())
            }
            None if v.as_i64().is_some() => Err(ConversionError::out_of_range(v, "Int32")),
            None => Err(ConversionError::type_mismatch("Int32", v.type_name())),
        },
        other => Err(ConversionError::type_mismatch("Int32", other.type_name())),
    }
}

fn set_f32(slot: &mut f32, value: FieldValue) -> Result<(), ConversionError> {
    match value {
        FieldValue::Value(OpcUaValue::Float(f)) => {
            *slot = f;
            Ok(())
        }
        other => Err(ConversionError::type_mismatch("Float", other.type_name())),
    }
}

fn set_string(slot: &mut String, value: FieldValue) -> Result<(), ConversionError> {
    match value {
        FieldValue::Value(OpcUaValue::String(s)) => {
            *slot = s;
            Ok(())
        }
        other => Err(ConversionError::type_mismatch("String", other.type_name())),
    }
}

fn set_timestamps(slot: &mut Vec<LocalTimestamp>, value: FieldValue) -> Result<(), ConversionError> {
    match value {
        FieldValue::Timestamps(ts) => {
            *slot = ts;
            Ok(())
        }
        other => Err(ConversionError::type_mismatch("Timestamps", other.type_name())),
    }
}

fn unknown(record: &str, field: &str) -> ConversionError {
    ConversionError::type_mismatch(format!("field of {}", record), format!("unknown field '{}'", field))
}

// =============================================================================
// Alarms
// =============================================================================

const ALARM_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::value("ID"),
    FieldDescriptor::value("Value"),
    FieldDescriptor::value("Message"),
    FieldDescriptor::value("Category"),
    FieldDescriptor::timestamps("DateTime"),
    FieldDescriptor::timestamps("AckDateTime"),
];

macro_rules! alarm_record {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Alarm number.
            pub id: i32,
            /// Alarm value.
            pub value: i32,
            /// Alarm text.
            pub message: String,
            /// Alarm category.
            pub category: i32,
            /// Raise time.
            pub date_time: Vec<LocalTimestamp>,
            /// Acknowledge time.
            pub ack_date_time: Vec<LocalTimestamp>,
        }

        impl Record for $name {
            const NAME: &'static str = $label;
            const FIELDS: &'static [FieldDescriptor] = ALARM_FIELDS;

            fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError> {
                match field.to_ascii_lowercase().as_str() {
                    "id" => set_i32(&mut self.id, value),
                    "value" => set_i32(&mut self.value, value),
                    "message" => set_string(&mut self.message, value),
                    "category" => set_i32(&mut self.category, value),
                    "datetime" => set_timestamps(&mut self.date_time, value),
                    "ackdatetime" => set_timestamps(&mut self.ack_date_time, value),
                    _ => Err(unknown(Self::NAME, field)),
                }
            }
        }
    };
}

alarm_record!(
    /// An active alarm.
    Alarm,
    "Alarm"
);

alarm_record!(
    /// An alarm from the history buffer.
    AlarmHistory,
    "AlarmHistory"
);

// =============================================================================
// Production counters
// =============================================================================

/// Processed product counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProdProcessed {
    /// Count in the current batch.
    pub count: i32,
    /// Accumulated count.
    pub acc_count: i32,
}

impl Record for ProdProcessed {
    const NAME: &'static str = "ProdProcessedCount";
    const FIELDS: &'static [FieldDescriptor] =
        &[FieldDescriptor::value("Count"), FieldDescriptor::value("AccCount")];

    fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError> {
        match field.to_ascii_lowercase().as_str() {
            "count" => set_i32(&mut self.count, value),
            "acccount" => set_i32(&mut self.acc_count, value),
            _ => Err(unknown(Self::NAME, field)),
        }
    }
}

const ID_COUNT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::value("ID"),
    FieldDescriptor::value("Count"),
    FieldDescriptor::value("AccCount"),
];

macro_rules! id_counter_record {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Product id.
            pub id: i32,
            /// Count in the current batch.
            pub count: i32,
            /// Accumulated count.
            pub acc_count: i32,
        }

        impl Record for $name {
            const NAME: &'static str = $label;
            const FIELDS: &'static [FieldDescriptor] = ID_COUNT_FIELDS;

            fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError> {
                match field.to_ascii_lowercase().as_str() {
                    "id" => set_i32(&mut self.id, value),
                    "count" => set_i32(&mut self.count, value),
                    "acccount" => set_i32(&mut self.acc_count, value),
                    _ => Err(unknown(Self::NAME, field)),
                }
            }
        }
    };
}

id_counter_record!(
    /// Consumed (measured) product counter.
    ProdConsumed,
    "ProdConsumedCount"
);

id_counter_record!(
    /// Defective product counter.
    ProdDefectCount,
    "ProdDefectiveCount"
);

// =============================================================================
// Pallet, stop reason, PLC clock
// =============================================================================

/// One pallet parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PalletInfo {
    /// Parameter id.
    pub id: i32,
    /// Parameter name.
    pub name: String,
    /// Engineering unit.
    pub unit: String,
    /// Parameter value.
    pub value: f32,
}

impl Record for PalletInfo {
    const NAME: &'static str = "Parameter";
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::value("ID"),
        FieldDescriptor::value("Name"),
        FieldDescriptor::value("Unit"),
        FieldDescriptor::value("Value"),
    ];

    fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError> {
        match field.to_ascii_lowercase().as_str() {
            "id" => set_i32(&mut self.id, value),
            "name" => set_string(&mut self.name, value),
            "unit" => set_string(&mut self.unit, value),
            "value" => set_f32(&mut self.value, value),
            _ => Err(unknown(Self::NAME, field)),
        }
    }
}

/// Why the machine last stopped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReason {
    /// Stop category.
    pub category: i32,
    /// Stop code.
    pub value: i32,
    /// Stop text.
    pub message: String,
    /// Stop time.
    pub date_time: Vec<LocalTimestamp>,
}

impl Record for StopReason {
    const NAME: &'static str = "StopReason";
    const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::value("Category"),
        FieldDescriptor::value("Value"),
        FieldDescriptor::value("Message"),
        FieldDescriptor::timestamps("DateTime"),
    ];

    fn assign(&mut self, field: &str, value: FieldValue) -> Result<(), ConversionError> {
        match field.to_ascii_lowercase().as_str() {
            "category" => set_i32(&mut self.category, value),
            "value" => set_i32(&mut self.value, value),
            "message" => set_string(&mut self.message, value),
            "datetime" => set_timestamps(&mut self.date_time, value),
            _ => Err(unknown(Self::NAME, field)),
        }
    }
}

/// The controller clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcDateTime {
    /// Controller time in the configured zone.
    pub time_stamp: LocalTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{local_from_parts, TimeZonePolicy};

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        assert_eq!(Alarm::field("ackdatetime").map(|f| f.kind), Some(FieldKind::Timestamps));
        assert_eq!(ProdConsumed::field("ACCCOUNT").map(|f| f.name), Some("AccCount"));
        assert!(PalletInfo::field("Dimensions").is_none());
    }

    #[test]
    fn test_integer_fields_accept_lossless_variants() {
        let mut rec = ProdDefectCount::default();
        rec.assign("ID", FieldValue::Value(OpcUaValue::UInt16(12))).unwrap();
        rec.assign("Count", FieldValue::Value(OpcUaValue::Int64(40))).unwrap();
        assert_eq!(rec.id, 12);
        assert_eq!(rec.count, 40);

        assert!(rec
            .assign("AccCount", FieldValue::Value(OpcUaValue::UInt32(u32::MAX)))
            .is_err());
        assert!(rec
            .assign("AccCount", FieldValue::Value(OpcUaValue::String("5".into())))
            .is_err());
        assert_eq!(rec.acc_count, 0);
    }

    #[test]
    fn test_float_and_string_are_strict() {
        let mut rec = PalletInfo::default();
        assert!(rec.assign("Value", FieldValue::Value(OpcUaValue::Double(1.0))).is_err());
        assert!(rec.assign("Value", FieldValue::Value(OpcUaValue::Int32(1))).is_err());
        rec.assign("Value", FieldValue::Value(OpcUaValue::Float(3.0))).unwrap();
        assert!(rec.assign("Name", FieldValue::Value(OpcUaValue::Int32(1))).is_err());
        rec.assign("name", FieldValue::Value(OpcUaValue::String("Capto_C6".into())))
            .unwrap();
        assert_eq!(rec.value, 3.0);
        assert_eq!(rec.name, "Capto_C6");
    }

    #[test]
    fn test_timestamp_assignment() {
        let ts = local_from_parts(&[2025, 5, 1, 8, 0, 0, 0], TimeZonePolicy::CentralEuropean).unwrap();
        let mut alarm = AlarmHistory::default();
        alarm.assign("DateTime", FieldValue::Timestamps(vec![ts])).unwrap();
        assert_eq!(alarm.date_time, vec![ts]);
        assert!(alarm
            .assign("AckDateTime", FieldValue::Value(OpcUaValue::Int32(3)))
            .is_err());
        assert!(alarm.ack_date_time.is_empty());
    }

    #[test]
    fn test_unknown_field() {
        let mut rec = StopReason::default();
        assert!(rec.assign("Nope", FieldValue::Value(OpcUaValue::Int32(1))).is_err());
    }
}
