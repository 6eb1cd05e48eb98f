// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Encode the in-memory model into Sparkplug B wire bytes.
//!
//! Signed narrow integers keep their two's-complement bit pattern and are
//! zero-extended into the wider wire field; unsigned conversions are always
//! widening.

use prost::Message;

use crate::{
    array, proto, DataSet, EncodeError, MetaData, Metric, MetricDataType, Parameter, PropertySet,
    PropertyValue, Row, SparkplugBPayload, Template, Value,
};

/// Encode a payload to wire bytes.
///
/// # Errors
///
/// Returns error if any metric's value shape is inconsistent with its
/// declared data type, or a value is out of range for the wire field.
pub fn encode(payload: &SparkplugBPayload) -> Result<Vec<u8>, EncodeError> {
    let proto = payload_to_proto(payload)?;
    let bytes = proto.encode_to_vec();
    log::trace!(
        "Encoded payload, seq {:?}, {} metrics, {} bytes",
        payload.seq,
        payload.metrics.len(),
        bytes.len()
    );
    Ok(bytes)
}

pub(crate) fn payload_to_proto(
    payload: &SparkplugBPayload,
) -> Result<proto::Payload, EncodeError> {
    let mut metrics = Vec::with_capacity(payload.metrics.len());
    for metric in &payload.metrics {
        metrics.push(metric_to_proto(metric)?);
    }
    Ok(proto::Payload {
        timestamp: payload.timestamp,
        metrics,
        seq: payload.seq,
        uuid: payload.uuid.clone(),
        body: payload.body.clone(),
    })
}

fn metric_to_proto(metric: &Metric) -> Result<proto::Metric, EncodeError> {
    if metric.data_type == MetricDataType::Unknown {
        return Err(EncodeError::UnknownType);
    }
    if !metric.value.matches(metric.data_type) {
        return Err(EncodeError::InvalidType {
            expected: metric.data_type.as_static_str(),
            got: metric.value.shape_name(),
        });
    }

    let mut metadata = metric.metadata.clone();
    let value = if metric.is_null() {
        None
    } else {
        Some(value_to_proto(&metric.value, &mut metadata)?)
    };

    let properties = metric
        .properties
        .as_ref()
        .map(property_set_to_proto)
        .transpose()?;

    Ok(proto::Metric {
        name: metric.name.clone(),
        alias: metric.alias,
        timestamp: metric.timestamp,
        datatype: Some(metric.data_type.code()),
        is_historical: metric.is_historical.then_some(true),
        is_transient: metric.is_transient.then_some(true),
        is_null: metric.is_null().then_some(true),
        metadata: metadata.as_ref().map(metadata_to_proto),
        properties,
        value,
    })
}

/// Encode one value into its wire field. `metadata` is updated in place for
/// the `File` case, which merges the file name without replacing other
/// fields.
fn value_to_proto(
    value: &Value,
    metadata: &mut Option<MetaData>,
) -> Result<proto::metric::Value, EncodeError> {
    use proto::metric::Value as W;

    Ok(match value {
        Value::Null => unreachable!("null handled by caller"),
        Value::Int8(v) => W::IntValue(u32::from(*v as u8)),
        Value::Int16(v) => W::IntValue(u32::from(*v as u16)),
        Value::Int32(v) => W::IntValue(*v as u32),
        Value::Int64(v) => W::LongValue(*v as u64),
        Value::UInt8(v) => W::IntValue(u32::from(*v)),
        Value::UInt16(v) => W::IntValue(u32::from(*v)),
        Value::UInt32(v) => W::LongValue(u64::from(*v)),
        Value::UInt64(v) => W::LongValue(*v),
        Value::Float(v) => W::FloatValue(*v),
        Value::Double(v) => W::DoubleValue(*v),
        Value::Boolean(v) => W::BooleanValue(*v),
        Value::String(s) | Value::Text(s) | Value::Uuid(s) => W::StringValue(s.clone()),
        Value::DateTime(v) => W::LongValue(*v),
        Value::Bytes(b) => W::BytesValue(b.clone()),
        Value::File(file) => {
            if file.file_name.is_some() {
                let meta = metadata.get_or_insert_with(MetaData::default);
                meta.file_name = file.file_name.clone();
            }
            W::BytesValue(file.bytes.clone())
        }
        Value::DataSet(ds) => W::DatasetValue(dataset_to_proto(ds)?),
        Value::Template(t) => W::TemplateValue(template_to_proto(t)?),
        Value::PropertySet(_) | Value::PropertySetList(_) => {
            return Err(EncodeError::InvalidType {
                expected: "metric value",
                got: value.shape_name(),
            })
        }
        Value::Int8Array(v) => W::BytesValue(array::encode_int8(v)),
        Value::Int16Array(v) => W::BytesValue(array::encode_int16(v)),
        Value::Int32Array(v) => W::BytesValue(array::encode_int32(v)),
        Value::Int64Array(v) => W::BytesValue(array::encode_int64(v)),
        Value::UInt8Array(v) => W::BytesValue(v.clone()),
        Value::UInt16Array(v) => W::BytesValue(array::encode_uint16(v)),
        Value::UInt32Array(v) => W::BytesValue(array::encode_uint32(v)),
        Value::UInt64Array(v) => W::BytesValue(array::encode_uint64(v)),
        Value::FloatArray(v) => W::BytesValue(array::encode_float(v)),
        Value::DoubleArray(v) => W::BytesValue(array::encode_double(v)),
        Value::BooleanArray(v) => W::BytesValue(array::encode_boolean(v)),
        Value::StringArray(v) => W::BytesValue(array::encode_string(v)),
        Value::DateTimeArray(v) => W::BytesValue(array::encode_datetime(v)),
    })
}

fn metadata_to_proto(meta: &MetaData) -> proto::MetaData {
    proto::MetaData {
        is_multi_part: meta.is_multi_part.then_some(true),
        content_type: meta.content_type.clone(),
        size: meta.size,
        seq: meta.seq,
        file_name: meta.file_name.clone(),
        file_type: meta.file_type.clone(),
        md5: meta.md5.clone(),
        description: meta.description.clone(),
    }
}

fn property_set_to_proto(set: &PropertySet) -> Result<proto::PropertySet, EncodeError> {
    let mut values = Vec::with_capacity(set.len());
    for (_key, value) in set.iter() {
        values.push(property_value_to_proto(value)?);
    }
    Ok(proto::PropertySet {
        keys: set.keys().to_vec(),
        values,
    })
}

fn property_value_to_proto(prop: &PropertyValue) -> Result<proto::PropertyValue, EncodeError> {
    use proto::property_value::Value as W;

    if !prop.value().matches_property(prop.data_type()) {
        return Err(EncodeError::InvalidType {
            expected: prop.data_type().as_static_str(),
            got: prop.value().shape_name(),
        });
    }

    let value = if prop.is_null() {
        None
    } else {
        Some(match prop.value() {
            Value::Int8(v) => W::IntValue(u32::from(*v as u8)),
            Value::Int16(v) => W::IntValue(u32::from(*v as u16)),
            Value::Int32(v) => W::IntValue(*v as u32),
            Value::Int64(v) => W::LongValue(*v as u64),
            Value::UInt8(v) => W::IntValue(u32::from(*v)),
            Value::UInt16(v) => W::IntValue(u32::from(*v)),
            Value::UInt32(v) => W::LongValue(u64::from(*v)),
            Value::UInt64(v) | Value::DateTime(v) => W::LongValue(*v),
            Value::Float(v) => W::FloatValue(*v),
            Value::Double(v) => W::DoubleValue(*v),
            Value::Boolean(v) => W::BooleanValue(*v),
            Value::String(s) | Value::Text(s) => W::StringValue(s.clone()),
            Value::PropertySet(set) => W::PropertysetValue(property_set_to_proto(set)?),
            Value::PropertySetList(sets) => {
                let mut propertyset = Vec::with_capacity(sets.len());
                for set in sets {
                    propertyset.push(property_set_to_proto(set)?);
                }
                W::PropertysetsValue(proto::PropertySetList { propertyset })
            }
            other => {
                return Err(EncodeError::InvalidType {
                    expected: "property value",
                    got: other.shape_name(),
                })
            }
        })
    };

    Ok(proto::PropertyValue {
        r#type: Some(prop.data_type().code()),
        is_null: prop.is_null().then_some(true),
        value,
    })
}

fn dataset_to_proto(ds: &DataSet) -> Result<proto::DataSet, EncodeError> {
    let mut rows = Vec::with_capacity(ds.rows().len());
    for row in ds.rows() {
        rows.push(row_to_proto(row, ds)?);
    }
    Ok(proto::DataSet {
        num_of_columns: Some(ds.num_of_columns()),
        columns: ds.column_names().to_vec(),
        types: ds.column_types().iter().map(|t| t.code()).collect(),
        rows,
    })
}

fn row_to_proto(row: &Row, ds: &DataSet) -> Result<proto::data_set::Row, EncodeError> {
    use proto::data_set::data_set_value::Value as W;

    if row.elements().len() != ds.column_types().len() {
        return Err(EncodeError::InvalidDataSet(format!(
            "row has {} elements, dataset has {} columns",
            row.elements().len(),
            ds.column_types().len()
        )));
    }

    let mut elements = Vec::with_capacity(row.elements().len());
    for (value, column_type) in row.elements().iter().zip(ds.column_types()) {
        if !value.matches_column(*column_type) {
            return Err(EncodeError::InvalidType {
                expected: column_type.as_static_str(),
                got: value.shape_name(),
            });
        }
        let wire = match value {
            Value::Null => None,
            Value::Int8(v) => Some(W::IntValue(u32::from(*v as u8))),
            Value::Int16(v) => Some(W::IntValue(u32::from(*v as u16))),
            Value::Int32(v) => Some(W::IntValue(*v as u32)),
            Value::Int64(v) => Some(W::LongValue(*v as u64)),
            Value::UInt8(v) => Some(W::IntValue(u32::from(*v))),
            Value::UInt16(v) => Some(W::IntValue(u32::from(*v))),
            Value::UInt32(v) => Some(W::LongValue(u64::from(*v))),
            Value::UInt64(v) | Value::DateTime(v) => Some(W::LongValue(*v)),
            Value::Float(v) => Some(W::FloatValue(*v)),
            Value::Double(v) => Some(W::DoubleValue(*v)),
            Value::Boolean(v) => Some(W::BooleanValue(*v)),
            Value::String(s) | Value::Text(s) => Some(W::StringValue(s.clone())),
            other => {
                return Err(EncodeError::InvalidType {
                    expected: column_type.as_static_str(),
                    got: other.shape_name(),
                })
            }
        };
        elements.push(proto::data_set::DataSetValue { value: wire });
    }
    Ok(proto::data_set::Row { elements })
}

fn template_to_proto(template: &Template) -> Result<proto::Template, EncodeError> {
    if template.is_definition() {
        if template.template_ref().is_some() {
            return Err(EncodeError::InvalidTemplate(
                "definition must not carry template_ref".to_string(),
            ));
        }
    } else if template.template_ref().is_none() {
        return Err(EncodeError::InvalidTemplate(
            "instance requires template_ref".to_string(),
        ));
    }

    let mut metrics = Vec::with_capacity(template.metrics().len());
    for metric in template.metrics() {
        metrics.push(metric_to_proto(metric)?);
    }

    let parameters = template
        .parameters()
        .iter()
        .map(parameter_to_proto)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(proto::Template {
        version: template.version().map(str::to_string),
        metrics,
        parameters,
        template_ref: template.template_ref().map(str::to_string),
        is_definition: Some(template.is_definition()),
    })
}

fn parameter_to_proto(param: &Parameter) -> Result<proto::Parameter, EncodeError> {
    use proto::parameter::Value as W;

    if !param.value().matches_parameter(param.data_type()) {
        return Err(EncodeError::InvalidType {
            expected: param.data_type().as_static_str(),
            got: param.value().shape_name(),
        });
    }

    let value = match param.value() {
        Value::Null => None,
        Value::Int8(v) => Some(W::IntValue(u32::from(*v as u8))),
        Value::Int16(v) => Some(W::IntValue(u32::from(*v as u16))),
        Value::Int32(v) => Some(W::IntValue(*v as u32)),
        Value::Int64(v) => Some(W::LongValue(*v as u64)),
        Value::UInt8(v) => Some(W::IntValue(u32::from(*v))),
        Value::UInt16(v) => Some(W::IntValue(u32::from(*v))),
        Value::UInt32(v) => Some(W::LongValue(u64::from(*v))),
        Value::UInt64(v) | Value::DateTime(v) => Some(W::LongValue(*v)),
        Value::Float(v) => Some(W::FloatValue(*v)),
        Value::Double(v) => Some(W::DoubleValue(*v)),
        Value::Boolean(v) => Some(W::BooleanValue(*v)),
        Value::String(s) | Value::Text(s) => Some(W::StringValue(s.clone())),
        other => {
            return Err(EncodeError::InvalidType {
                expected: "parameter value",
                got: other.shape_name(),
            })
        }
    };

    Ok(proto::Parameter {
        name: Some(param.name().to_string()),
        r#type: Some(param.data_type().code()),
        value,
    })
}
