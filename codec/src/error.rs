// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};

/// Represent the types of errors returned while building wire payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Value shape does not match the declared data type.
    InvalidType {
        expected: &'static str,
        got: &'static str,
    },

    /// Numeric value is outside the range of the declared data type.
    OutOfRange,

    /// Data type is `Unknown` or not encodable in this position.
    UnknownType,

    /// A template instance has no `template_ref`, or a definition has one.
    InvalidTemplate(String),

    /// DataSet column/row geometry is inconsistent.
    InvalidDataSet(String),
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidType { expected, got } => {
                write!(f, "Invalid value type, expected {expected}, got {got}")
            }
            Self::OutOfRange => write!(f, "Value out of range"),
            Self::UnknownType => write!(f, "Unknown data type"),
            Self::InvalidTemplate(msg) => write!(f, "Invalid template: {msg}"),
            Self::InvalidDataSet(msg) => write!(f, "Invalid dataset: {msg}"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Represent the types of errors returned while parsing wire payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Protobuf level parse failure.
    InvalidWire(String),

    /// The populated value field is inconsistent with the `datatype` code.
    TypeMismatch {
        datatype: &'static str,
        field: &'static str,
    },

    /// Packed array buffer length is not a whole number of elements,
    /// or a string element has no terminator.
    TruncatedArray,

    /// The `datatype` code is not in the Sparkplug B table.
    UnknownType(u32),

    /// Invalid UTF-8 string.
    InvalidString,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidWire(msg) => write!(f, "Invalid protobuf payload: {msg}"),
            Self::TypeMismatch { datatype, field } => {
                write!(
                    f,
                    "Type mismatch, datatype {datatype} with value field {field}"
                )
            }
            Self::TruncatedArray => write!(f, "Truncated packed array"),
            Self::UnknownType(code) => write!(f, "Unknown data type code {code}"),
            Self::InvalidString => write!(f, "Invalid UTF-8 string"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        Self::InvalidWire(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(_err: std::string::FromUtf8Error) -> Self {
        Self::InvalidString
    }
}
