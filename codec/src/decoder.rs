// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Decode Sparkplug B wire bytes into the in-memory model.
//!
//! Unknown protobuf fields are skipped for forward compatibility; a payload
//! whose populated value field contradicts its `datatype` code is rejected.

use bytes::Buf;
use prost::Message;

use crate::{
    proto, DataSet, DataSetDataType, DecodeError, File, MetaData, Metric, MetricDataType,
    Parameter, ParameterDataType, PropertyDataType, PropertySet, PropertyValue, Row,
    SparkplugBPayload, Template, Value, array,
};

/// Decode a payload from wire bytes.
///
/// # Errors
///
/// Returns error if the bytes are not a valid protobuf payload or any
/// typed value is inconsistent.
pub fn decode(buf: impl Buf) -> Result<SparkplugBPayload, DecodeError> {
    let proto = proto::Payload::decode(buf)?;
    log::trace!(
        "Decoding payload, seq {:?}, {} metrics",
        proto.seq,
        proto.metrics.len()
    );
    payload_from_proto(proto)
}

pub(crate) fn payload_from_proto(
    proto: proto::Payload,
) -> Result<SparkplugBPayload, DecodeError> {
    let mut metrics = Vec::with_capacity(proto.metrics.len());
    for metric in proto.metrics {
        metrics.push(metric_from_proto(metric)?);
    }
    Ok(SparkplugBPayload {
        timestamp: proto.timestamp,
        seq: proto.seq,
        uuid: proto.uuid,
        metrics,
        body: proto.body,
    })
}

fn metric_from_proto(proto: proto::Metric) -> Result<Metric, DecodeError> {
    let Some(code) = proto.datatype else {
        return Err(DecodeError::InvalidWire(
            "metric without datatype".to_string(),
        ));
    };
    let data_type = MetricDataType::try_from(code)?;
    let metadata = proto.metadata.map(metadata_from_proto);

    let value = match (proto.is_null.unwrap_or(false), proto.value) {
        (true, _) | (false, None) => Value::Null,
        (false, Some(wire)) => value_from_proto(data_type, wire, metadata.as_ref())?,
    };

    let properties = proto.properties.map(property_set_from_proto).transpose()?;

    Ok(Metric {
        name: proto.name,
        alias: proto.alias,
        timestamp: proto.timestamp,
        data_type,
        is_historical: proto.is_historical.unwrap_or(false),
        is_transient: proto.is_transient.unwrap_or(false),
        metadata,
        properties,
        value,
    })
}

fn value_from_proto(
    data_type: MetricDataType,
    wire: proto::metric::Value,
    metadata: Option<&MetaData>,
) -> Result<Value, DecodeError> {
    use proto::metric::Value as W;

    let mismatch = |wire: &W| DecodeError::TypeMismatch {
        datatype: data_type.as_static_str(),
        field: wire.field_name(),
    };

    // Narrow integers are truncated to their width, accepting both the
    // zero-extended form this encoder writes and sign-extended legacy
    // payloads.
    Ok(match (data_type, wire) {
        (MetricDataType::Int8, W::IntValue(v)) => Value::Int8(v as u8 as i8),
        (MetricDataType::Int16, W::IntValue(v)) => Value::Int16(v as u16 as i16),
        (MetricDataType::Int32, W::IntValue(v)) => Value::Int32(v as i32),
        (MetricDataType::Int64, W::LongValue(v)) => Value::Int64(v as i64),
        (MetricDataType::UInt8, W::IntValue(v)) => Value::UInt8(v as u8),
        (MetricDataType::UInt16, W::IntValue(v)) => Value::UInt16(v as u16),
        (MetricDataType::UInt32, W::LongValue(v)) => Value::UInt32(v as u32),
        (MetricDataType::UInt64, W::LongValue(v)) => Value::UInt64(v),
        (MetricDataType::Float, W::FloatValue(v)) => Value::Float(v),
        (MetricDataType::Double, W::DoubleValue(v)) => Value::Double(v),
        (MetricDataType::Boolean, W::BooleanValue(v)) => Value::Boolean(v),
        (MetricDataType::String, W::StringValue(s)) => Value::String(s),
        (MetricDataType::Text, W::StringValue(s)) => Value::Text(s),
        (MetricDataType::Uuid, W::StringValue(s)) => Value::Uuid(s),
        (MetricDataType::DateTime, W::LongValue(v)) => Value::DateTime(v),
        (MetricDataType::Bytes, W::BytesValue(b)) => Value::Bytes(b),
        (MetricDataType::File, W::BytesValue(b)) => Value::File(File::new(
            metadata.and_then(|m| m.file_name.clone()),
            b,
        )),
        (MetricDataType::DataSet, W::DatasetValue(ds)) => {
            Value::DataSet(dataset_from_proto(ds)?)
        }
        (MetricDataType::Template, W::TemplateValue(t)) => {
            Value::Template(template_from_proto(t)?)
        }
        (MetricDataType::Int8Array, W::BytesValue(b)) => Value::Int8Array(array::decode_int8(&b)),
        (MetricDataType::Int16Array, W::BytesValue(b)) => {
            Value::Int16Array(array::decode_int16(&b)?)
        }
        (MetricDataType::Int32Array, W::BytesValue(b)) => {
            Value::Int32Array(array::decode_int32(&b)?)
        }
        (MetricDataType::Int64Array, W::BytesValue(b)) => {
            Value::Int64Array(array::decode_int64(&b)?)
        }
        (MetricDataType::UInt8Array, W::BytesValue(b)) => Value::UInt8Array(b),
        (MetricDataType::UInt16Array, W::BytesValue(b)) => {
            Value::UInt16Array(array::decode_uint16(&b)?)
        }
        (MetricDataType::UInt32Array, W::BytesValue(b)) => {
            Value::UInt32Array(array::decode_uint32(&b)?)
        }
        (MetricDataType::UInt64Array, W::BytesValue(b)) => {
            Value::UInt64Array(array::decode_uint64(&b)?)
        }
        (MetricDataType::FloatArray, W::BytesValue(b)) => {
            Value::FloatArray(array::decode_float(&b)?)
        }
        (MetricDataType::DoubleArray, W::BytesValue(b)) => {
            Value::DoubleArray(array::decode_double(&b)?)
        }
        (MetricDataType::BooleanArray, W::BytesValue(b)) => {
            Value::BooleanArray(array::decode_boolean(&b)?)
        }
        (MetricDataType::StringArray, W::BytesValue(b)) => {
            Value::StringArray(array::decode_string(&b)?)
        }
        (MetricDataType::DateTimeArray, W::BytesValue(b)) => {
            Value::DateTimeArray(array::decode_datetime(&b)?)
        }
        (_, wire) => return Err(mismatch(&wire)),
    })
}

fn metadata_from_proto(proto: proto::MetaData) -> MetaData {
    MetaData {
        is_multi_part: proto.is_multi_part.unwrap_or(false),
        content_type: proto.content_type,
        size: proto.size,
        seq: proto.seq,
        file_name: proto.file_name,
        file_type: proto.file_type,
        md5: proto.md5,
        description: proto.description,
    }
}

fn property_set_from_proto(proto: proto::PropertySet) -> Result<PropertySet, DecodeError> {
    if proto.keys.len() != proto.values.len() {
        return Err(DecodeError::InvalidWire(format!(
            "property set with {} keys but {} values",
            proto.keys.len(),
            proto.values.len()
        )));
    }
    let mut values = Vec::with_capacity(proto.values.len());
    for value in proto.values {
        values.push(property_value_from_proto(value)?);
    }
    Ok(PropertySet::from_parts(proto.keys, values))
}

fn property_value_from_proto(proto: proto::PropertyValue) -> Result<PropertyValue, DecodeError> {
    use proto::property_value::Value as W;

    let Some(code) = proto.r#type else {
        return Err(DecodeError::InvalidWire(
            "property value without type".to_string(),
        ));
    };
    let data_type = PropertyDataType::try_from(code)?;

    let mismatch = |field: &'static str| DecodeError::TypeMismatch {
        datatype: data_type.as_static_str(),
        field,
    };

    let value = match (proto.is_null.unwrap_or(false), proto.value) {
        (true, _) | (false, None) => Value::Null,
        (false, Some(wire)) => match (data_type, wire) {
            (PropertyDataType::Int8, W::IntValue(v)) => Value::Int8(v as u8 as i8),
            (PropertyDataType::Int16, W::IntValue(v)) => Value::Int16(v as u16 as i16),
            (PropertyDataType::Int32, W::IntValue(v)) => Value::Int32(v as i32),
            (PropertyDataType::Int64, W::LongValue(v)) => Value::Int64(v as i64),
            (PropertyDataType::UInt8, W::IntValue(v)) => Value::UInt8(v as u8),
            (PropertyDataType::UInt16, W::IntValue(v)) => Value::UInt16(v as u16),
            (PropertyDataType::UInt32, W::LongValue(v)) => Value::UInt32(v as u32),
            (PropertyDataType::UInt64, W::LongValue(v)) => Value::UInt64(v),
            (PropertyDataType::DateTime, W::LongValue(v)) => Value::DateTime(v),
            (PropertyDataType::Float, W::FloatValue(v)) => Value::Float(v),
            (PropertyDataType::Double, W::DoubleValue(v)) => Value::Double(v),
            (PropertyDataType::Boolean, W::BooleanValue(v)) => Value::Boolean(v),
            (PropertyDataType::String, W::StringValue(s)) => Value::String(s),
            (PropertyDataType::Text, W::StringValue(s)) => Value::Text(s),
            (PropertyDataType::PropertySet, W::PropertysetValue(set)) => {
                Value::PropertySet(property_set_from_proto(set)?)
            }
            (PropertyDataType::PropertySetList, W::PropertysetsValue(list)) => {
                let mut sets = Vec::with_capacity(list.propertyset.len());
                for set in list.propertyset {
                    sets.push(property_set_from_proto(set)?);
                }
                Value::PropertySetList(sets)
            }
            (_, wire) => {
                let field = match wire {
                    W::IntValue(_) => "int_value",
                    W::LongValue(_) => "long_value",
                    W::FloatValue(_) => "float_value",
                    W::DoubleValue(_) => "double_value",
                    W::BooleanValue(_) => "boolean_value",
                    W::StringValue(_) => "string_value",
                    W::PropertysetValue(_) => "propertyset_value",
                    W::PropertysetsValue(_) => "propertysets_value",
                };
                return Err(mismatch(field));
            }
        }
    };

    Ok(PropertyValue::new(data_type, value))
}

fn dataset_from_proto(proto: proto::DataSet) -> Result<DataSet, DecodeError> {
    if proto.columns.len() != proto.types.len() {
        return Err(DecodeError::InvalidWire(format!(
            "dataset with {} columns but {} types",
            proto.columns.len(),
            proto.types.len()
        )));
    }

    let column_types = proto
        .types
        .iter()
        .map(|code| DataSetDataType::try_from(*code))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(proto.rows.len());
    for row in proto.rows {
        rows.push(row_from_proto(row, &column_types)?);
    }

    Ok(DataSet::from_parts(proto.columns, column_types, rows))
}

fn row_from_proto(
    proto: proto::data_set::Row,
    column_types: &[DataSetDataType],
) -> Result<Row, DecodeError> {
    use proto::data_set::data_set_value::Value as W;

    if proto.elements.len() != column_types.len() {
        return Err(DecodeError::InvalidWire(format!(
            "row with {} elements but {} columns",
            proto.elements.len(),
            column_types.len()
        )));
    }

    let mut elements = Vec::with_capacity(proto.elements.len());
    for (element, column_type) in proto.elements.into_iter().zip(column_types) {
        let value = match (column_type, element.value) {
            (_, None) => Value::Null,
            (DataSetDataType::Int8, Some(W::IntValue(v))) => Value::Int8(v as u8 as i8),
            (DataSetDataType::Int16, Some(W::IntValue(v))) => Value::Int16(v as u16 as i16),
            (DataSetDataType::Int32, Some(W::IntValue(v))) => Value::Int32(v as i32),
            (DataSetDataType::Int64, Some(W::LongValue(v))) => Value::Int64(v as i64),
            (DataSetDataType::UInt8, Some(W::IntValue(v))) => Value::UInt8(v as u8),
            (DataSetDataType::UInt16, Some(W::IntValue(v))) => Value::UInt16(v as u16),
            (DataSetDataType::UInt32, Some(W::LongValue(v))) => Value::UInt32(v as u32),
            (DataSetDataType::UInt64, Some(W::LongValue(v))) => Value::UInt64(v),
            (DataSetDataType::DateTime, Some(W::LongValue(v))) => Value::DateTime(v),
            (DataSetDataType::Float, Some(W::FloatValue(v))) => Value::Float(v),
            (DataSetDataType::Double, Some(W::DoubleValue(v))) => Value::Double(v),
            (DataSetDataType::Boolean, Some(W::BooleanValue(v))) => Value::Boolean(v),
            (DataSetDataType::String, Some(W::StringValue(s))) => Value::String(s),
            (DataSetDataType::Text, Some(W::StringValue(s))) => Value::Text(s),
            (column_type, Some(_)) => {
                return Err(DecodeError::TypeMismatch {
                    datatype: column_type.as_static_str(),
                    field: "dataset element",
                })
            }
        };
        elements.push(value);
    }
    Ok(Row::new(elements))
}

fn template_from_proto(proto: proto::Template) -> Result<Template, DecodeError> {
    let mut metrics = Vec::with_capacity(proto.metrics.len());
    for metric in proto.metrics {
        metrics.push(metric_from_proto(metric)?);
    }

    let parameters = proto
        .parameters
        .into_iter()
        .map(parameter_from_proto)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Template::from_parts(
        proto.is_definition.unwrap_or(false),
        proto.version,
        proto.template_ref,
        metrics,
        parameters,
    ))
}

fn parameter_from_proto(proto: proto::Parameter) -> Result<Parameter, DecodeError> {
    use proto::parameter::Value as W;

    let Some(code) = proto.r#type else {
        return Err(DecodeError::InvalidWire(
            "parameter without type".to_string(),
        ));
    };
    let data_type = ParameterDataType::try_from(code)?;
    let name = proto.name.unwrap_or_default();

    let value = match (data_type, proto.value) {
        (_, None) => Value::Null,
        (ParameterDataType::Int8, Some(W::IntValue(v))) => Value::Int8(v as u8 as i8),
        (ParameterDataType::Int16, Some(W::IntValue(v))) => Value::Int16(v as u16 as i16),
        (ParameterDataType::Int32, Some(W::IntValue(v))) => Value::Int32(v as i32),
        (ParameterDataType::Int64, Some(W::LongValue(v))) => Value::Int64(v as i64),
        (ParameterDataType::UInt8, Some(W::IntValue(v))) => Value::UInt8(v as u8),
        (ParameterDataType::UInt16, Some(W::IntValue(v))) => Value::UInt16(v as u16),
        (ParameterDataType::UInt32, Some(W::LongValue(v))) => Value::UInt32(v as u32),
        (ParameterDataType::UInt64, Some(W::LongValue(v))) => Value::UInt64(v),
        (ParameterDataType::DateTime, Some(W::LongValue(v))) => Value::DateTime(v),
        (ParameterDataType::Float, Some(W::FloatValue(v))) => Value::Float(v),
        (ParameterDataType::Double, Some(W::DoubleValue(v))) => Value::Double(v),
        (ParameterDataType::Boolean, Some(W::BooleanValue(v))) => Value::Boolean(v),
        (ParameterDataType::String, Some(W::StringValue(s))) => Value::String(s),
        (ParameterDataType::Text, Some(W::StringValue(s))) => Value::Text(s),
        (data_type, Some(_)) => {
            return Err(DecodeError::TypeMismatch {
                datatype: data_type.as_static_str(),
                field: "parameter value",
            })
        }
    };

    Ok(Parameter::new(&name, data_type, value))
}
