// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{MetaData, MetricDataType, PropertySet, Value};

/// Name of the birth/death sequence metric carried in NBIRTH and NDEATH.
pub const BD_SEQ_METRIC: &str = "bdSeq";

/// Name of the rebirth control metric a host writes to request a new BIRTH.
pub const REBIRTH_METRIC: &str = "Node Control/Rebirth";

/// A single named (or alias-referenced) typed value inside a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// Absent name means "alias-only reference": the receiver resolves the
    /// metric through the alias registered by the birth certificate.
    pub name: Option<String>,
    pub alias: Option<u64>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: Option<u64>,
    pub data_type: MetricDataType,
    pub is_historical: bool,
    pub is_transient: bool,
    pub metadata: Option<MetaData>,
    pub properties: Option<PropertySet>,
    pub value: Value,
}

impl Metric {
    /// Create a named metric with a value.
    #[must_use]
    pub fn new(name: &str, data_type: MetricDataType, value: Value) -> Self {
        Self {
            name: Some(name.to_string()),
            alias: None,
            timestamp: None,
            data_type,
            is_historical: false,
            is_transient: false,
            metadata: None,
            properties: None,
            value,
        }
    }

    /// Create an alias-only metric reference.
    #[must_use]
    pub fn by_alias(alias: u64, data_type: MetricDataType, value: Value) -> Self {
        Self {
            name: None,
            alias: Some(alias),
            timestamp: None,
            data_type,
            is_historical: false,
            is_transient: false,
            metadata: None,
            properties: None,
            value,
        }
    }

    /// The `bdSeq` metric included as the first metric of NBIRTH/NDEATH.
    #[must_use]
    pub fn bd_seq(bd_seq: u64) -> Self {
        Self::new(BD_SEQ_METRIC, MetricDataType::UInt64, Value::UInt64(bd_seq))
    }

    /// The `Node Control/Rebirth` command metric.
    #[must_use]
    pub fn rebirth_request() -> Self {
        Self::new(REBIRTH_METRIC, MetricDataType::Boolean, Value::Boolean(true))
    }

    #[must_use]
    pub fn with_alias(mut self, alias: u64) -> Self {
        self.alias = Some(alias);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = Some(properties);
        self
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value == Value::Null
    }

    /// True if this is the `bdSeq` metric; returns its value.
    #[must_use]
    pub fn bd_seq_value(&self) -> Option<u64> {
        if self.name.as_deref() != Some(BD_SEQ_METRIC) {
            return None;
        }
        match self.value {
            Value::UInt64(v) | Value::DateTime(v) => Some(v),
            Value::Int64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bd_seq_metric() {
        let metric = Metric::bd_seq(42);
        assert_eq!(metric.name.as_deref(), Some("bdSeq"));
        assert_eq!(metric.data_type, MetricDataType::UInt64);
        assert_eq!(metric.bd_seq_value(), Some(42));

        let other = Metric::new("seq", MetricDataType::UInt64, Value::UInt64(1));
        assert_eq!(other.bd_seq_value(), None);
    }

    #[test]
    fn test_rebirth_metric() {
        let metric = Metric::rebirth_request();
        assert_eq!(metric.name.as_deref(), Some("Node Control/Rebirth"));
        assert_eq!(metric.value, Value::Boolean(true));
    }
}
