// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::DecodeError;

/// Data types a metric value can carry.
///
/// Each variant maps to the stable integer code written to the wire
/// `datatype` field. `PropertySet`/`PropertySetList` (codes 20/21) are
/// reserved for property values and are not valid metric types.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricDataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
    Uuid = 15,
    DataSet = 16,
    Bytes = 17,
    File = 18,
    Template = 19,
    Int8Array = 22,
    Int16Array = 23,
    Int32Array = 24,
    Int64Array = 25,
    UInt8Array = 26,
    UInt16Array = 27,
    UInt32Array = 28,
    UInt64Array = 29,
    FloatArray = 30,
    DoubleArray = 31,
    BooleanArray = 32,
    StringArray = 33,
    DateTimeArray = 34,
}

impl MetricDataType {
    /// Get the wire code of this data type.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Returns true if values of this type are encoded as packed byte arrays.
    #[must_use]
    pub const fn is_array(self) -> bool {
        self.code() >= Self::Int8Array.code() && self.code() <= Self::DateTimeArray.code()
    }

    pub(crate) const fn as_static_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Text => "Text",
            Self::Uuid => "Uuid",
            Self::DataSet => "DataSet",
            Self::Bytes => "Bytes",
            Self::File => "File",
            Self::Template => "Template",
            Self::Int8Array => "Int8Array",
            Self::Int16Array => "Int16Array",
            Self::Int32Array => "Int32Array",
            Self::Int64Array => "Int64Array",
            Self::UInt8Array => "UInt8Array",
            Self::UInt16Array => "UInt16Array",
            Self::UInt32Array => "UInt32Array",
            Self::UInt64Array => "UInt64Array",
            Self::FloatArray => "FloatArray",
            Self::DoubleArray => "DoubleArray",
            Self::BooleanArray => "BooleanArray",
            Self::StringArray => "StringArray",
            Self::DateTimeArray => "DateTimeArray",
        }
    }
}

impl Display for MetricDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u32> for MetricDataType {
    type Error = DecodeError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Int64),
            5 => Ok(Self::UInt8),
            6 => Ok(Self::UInt16),
            7 => Ok(Self::UInt32),
            8 => Ok(Self::UInt64),
            9 => Ok(Self::Float),
            10 => Ok(Self::Double),
            11 => Ok(Self::Boolean),
            12 => Ok(Self::String),
            13 => Ok(Self::DateTime),
            14 => Ok(Self::Text),
            15 => Ok(Self::Uuid),
            16 => Ok(Self::DataSet),
            17 => Ok(Self::Bytes),
            18 => Ok(Self::File),
            19 => Ok(Self::Template),
            22 => Ok(Self::Int8Array),
            23 => Ok(Self::Int16Array),
            24 => Ok(Self::Int32Array),
            25 => Ok(Self::Int64Array),
            26 => Ok(Self::UInt8Array),
            27 => Ok(Self::UInt16Array),
            28 => Ok(Self::UInt32Array),
            29 => Ok(Self::UInt64Array),
            30 => Ok(Self::FloatArray),
            31 => Ok(Self::DoubleArray),
            32 => Ok(Self::BooleanArray),
            33 => Ok(Self::StringArray),
            34 => Ok(Self::DateTimeArray),
            _ => Err(DecodeError::UnknownType(v)),
        }
    }
}

/// Data types a property value can carry.
///
/// Scalar types share codes with [`MetricDataType`]; property sets may nest
/// via `PropertySet`/`PropertySetList`. Arrays and composite metric types
/// are not valid here.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyDataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
    PropertySet = 20,
    PropertySetList = 21,
}

impl PropertyDataType {
    /// Get the wire code of this data type.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub(crate) const fn as_static_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Text => "Text",
            Self::PropertySet => "PropertySet",
            Self::PropertySetList => "PropertySetList",
        }
    }
}

impl Display for PropertyDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u32> for PropertyDataType {
    type Error = DecodeError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Int64),
            5 => Ok(Self::UInt8),
            6 => Ok(Self::UInt16),
            7 => Ok(Self::UInt32),
            8 => Ok(Self::UInt64),
            9 => Ok(Self::Float),
            10 => Ok(Self::Double),
            11 => Ok(Self::Boolean),
            12 => Ok(Self::String),
            13 => Ok(Self::DateTime),
            14 => Ok(Self::Text),
            20 => Ok(Self::PropertySet),
            21 => Ok(Self::PropertySetList),
            _ => Err(DecodeError::UnknownType(v)),
        }
    }
}

/// Data types a template parameter can carry. Scalars only.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterDataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
}

impl ParameterDataType {
    /// Get the wire code of this data type.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub(crate) const fn as_static_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Text => "Text",
        }
    }
}

impl Display for ParameterDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u32> for ParameterDataType {
    type Error = DecodeError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Int64),
            5 => Ok(Self::UInt8),
            6 => Ok(Self::UInt16),
            7 => Ok(Self::UInt32),
            8 => Ok(Self::UInt64),
            9 => Ok(Self::Float),
            10 => Ok(Self::Double),
            11 => Ok(Self::Boolean),
            12 => Ok(Self::String),
            13 => Ok(Self::DateTime),
            14 => Ok(Self::Text),
            _ => Err(DecodeError::UnknownType(v)),
        }
    }
}

/// Data types a dataset column can carry. Scalars only.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSetDataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
}

impl DataSetDataType {
    /// Get the wire code of this data type.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub(crate) const fn as_static_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Text => "Text",
        }
    }
}

impl Display for DataSetDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u32> for DataSetDataType {
    type Error = DecodeError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Int8),
            2 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Int64),
            5 => Ok(Self::UInt8),
            6 => Ok(Self::UInt16),
            7 => Ok(Self::UInt32),
            8 => Ok(Self::UInt64),
            9 => Ok(Self::Float),
            10 => Ok(Self::Double),
            11 => Ok(Self::Boolean),
            12 => Ok(Self::String),
            13 => Ok(Self::DateTime),
            14 => Ok(Self::Text),
            _ => Err(DecodeError::UnknownType(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_codes_round_trip() {
        for code in (0..=34).filter(|c| *c != 20 && *c != 21) {
            let dt = MetricDataType::try_from(code).unwrap();
            assert_eq!(dt.code(), code);
        }
        assert!(MetricDataType::try_from(20).is_err());
        assert!(MetricDataType::try_from(21).is_err());
        assert!(MetricDataType::try_from(35).is_err());
    }

    #[test]
    fn test_is_array() {
        assert!(MetricDataType::Int8Array.is_array());
        assert!(MetricDataType::DateTimeArray.is_array());
        assert!(!MetricDataType::Template.is_array());
        assert!(!MetricDataType::Unknown.is_array());
    }

    #[test]
    fn test_property_codes() {
        assert_eq!(PropertyDataType::PropertySet.code(), 20);
        assert_eq!(PropertyDataType::PropertySetList.code(), 21);
        assert!(PropertyDataType::try_from(22).is_err());
        assert!(ParameterDataType::try_from(20).is_err());
        assert!(DataSetDataType::try_from(16).is_err());
    }
}
