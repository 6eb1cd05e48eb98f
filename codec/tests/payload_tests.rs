// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use prost::Message;

use tahu_codec::{
    decode, encode, proto, DataSet, DataSetDataType, DecodeError, EncodeError, File, MetaData,
    Metric, MetricDataType, Parameter, ParameterDataType, PropertyDataType, PropertySet,
    PropertyValue, Row, SparkplugBPayload, Template, Value,
};

fn round_trip(payload: &SparkplugBPayload) -> SparkplugBPayload {
    let bytes = encode(payload).unwrap();
    decode(bytes.as_slice()).unwrap()
}

fn single_metric_payload(metric: Metric) -> SparkplugBPayload {
    let mut payload = SparkplugBPayload::new().with_timestamp(1_700_000_000_000);
    payload.add_metric(metric);
    payload
}

#[test]
fn test_int32_negative_one_wire_form() {
    let payload = single_metric_payload(Metric::new("t", MetricDataType::Int32, Value::Int32(-1)));
    let bytes = encode(&payload).unwrap();

    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::IntValue(0xFFFF_FFFF))
    );

    let decoded = decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded.metrics[0].value, Value::Int32(-1));
}

#[test]
fn test_narrow_signed_zero_extension() {
    let payload = single_metric_payload(Metric::new("b", MetricDataType::Int8, Value::Int8(-1)));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::IntValue(0xFF))
    );

    let payload = single_metric_payload(Metric::new("s", MetricDataType::Int16, Value::Int16(-1)));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::IntValue(0xFFFF))
    );
}

#[test]
fn test_uint64_all_ones() {
    let payload = single_metric_payload(Metric::new(
        "u",
        MetricDataType::UInt64,
        Value::UInt64(u64::MAX),
    ));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::LongValue(u64::MAX))
    );
    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_round_trip_every_scalar_type() {
    let metrics = vec![
        Metric::new("i8", MetricDataType::Int8, Value::Int8(-12)),
        Metric::new("i16", MetricDataType::Int16, Value::Int16(-1234)),
        Metric::new("i32", MetricDataType::Int32, Value::Int32(-123_456)),
        Metric::new("i64", MetricDataType::Int64, Value::Int64(i64::MIN)),
        Metric::new("u8", MetricDataType::UInt8, Value::UInt8(200)),
        Metric::new("u16", MetricDataType::UInt16, Value::UInt16(60_000)),
        Metric::new("u32", MetricDataType::UInt32, Value::UInt32(u32::MAX)),
        Metric::new("u64", MetricDataType::UInt64, Value::UInt64(u64::MAX)),
        Metric::new("f32", MetricDataType::Float, Value::Float(1.25)),
        Metric::new("f64", MetricDataType::Double, Value::Double(-2.5e300)),
        Metric::new("bool", MetricDataType::Boolean, Value::Boolean(true)),
        Metric::new("str", MetricDataType::String, Value::String("hello".into())),
        Metric::new(
            "dt",
            MetricDataType::DateTime,
            Value::DateTime(1_700_000_000_000),
        ),
        Metric::new("txt", MetricDataType::Text, Value::Text("big text".into())),
        Metric::new(
            "uuid",
            MetricDataType::Uuid,
            Value::Uuid("123e4567-e89b-12d3-a456-426614174000".into()),
        ),
        Metric::new("raw", MetricDataType::Bytes, Value::Bytes(vec![0, 1, 2, 255])),
    ];

    let mut payload = SparkplugBPayload::new()
        .with_timestamp(1_700_000_000_000)
        .with_seq(42);
    for metric in metrics {
        payload.add_metric(metric);
    }
    payload.uuid = Some("batch-1".to_string());
    payload.body = Some(vec![9, 9, 9]);

    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_round_trip_every_array_type() {
    let metrics = vec![
        Metric::new(
            "ai8",
            MetricDataType::Int8Array,
            Value::Int8Array(vec![-1, 0, 127]),
        ),
        Metric::new(
            "ai16",
            MetricDataType::Int16Array,
            Value::Int16Array(vec![-2, 0x0102]),
        ),
        Metric::new(
            "ai32",
            MetricDataType::Int32Array,
            Value::Int32Array(vec![i32::MIN, i32::MAX]),
        ),
        Metric::new(
            "ai64",
            MetricDataType::Int64Array,
            Value::Int64Array(vec![i64::MIN, i64::MAX]),
        ),
        Metric::new(
            "au8",
            MetricDataType::UInt8Array,
            Value::UInt8Array(vec![0, 128, 255]),
        ),
        Metric::new(
            "au16",
            MetricDataType::UInt16Array,
            Value::UInt16Array(vec![0, u16::MAX]),
        ),
        Metric::new(
            "au32",
            MetricDataType::UInt32Array,
            Value::UInt32Array(vec![0, u32::MAX]),
        ),
        Metric::new(
            "au64",
            MetricDataType::UInt64Array,
            Value::UInt64Array(vec![0, u64::MAX]),
        ),
        Metric::new(
            "af32",
            MetricDataType::FloatArray,
            Value::FloatArray(vec![1.5, -0.25]),
        ),
        Metric::new(
            "af64",
            MetricDataType::DoubleArray,
            Value::DoubleArray(vec![1.5e10, -2.5]),
        ),
        Metric::new(
            "abool",
            MetricDataType::BooleanArray,
            Value::BooleanArray(vec![true, false, true, true, false, false, false, false, true]),
        ),
        Metric::new(
            "astr",
            MetricDataType::StringArray,
            Value::StringArray(vec!["ab".into(), String::new(), "c".into()]),
        ),
        Metric::new(
            "adt",
            MetricDataType::DateTimeArray,
            Value::DateTimeArray(vec![0, 1_700_000_000_000]),
        ),
    ];

    let mut payload = SparkplugBPayload::new().with_timestamp(1);
    for metric in metrics {
        payload.add_metric(metric);
    }
    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_boolean_array_wire_bytes() {
    let payload = single_metric_payload(Metric::new(
        "flags",
        MetricDataType::BooleanArray,
        Value::BooleanArray(vec![true, false, true, true, false, false, false, false, true]),
    ));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::BytesValue(vec![
            0x09, 0x00, 0x00, 0x00, 0xb0, 0x80
        ]))
    );
}

#[test]
fn test_string_array_wire_bytes() {
    let payload = single_metric_payload(Metric::new(
        "names",
        MetricDataType::StringArray,
        Value::StringArray(vec!["ab".into(), String::new(), "c".into()]),
    ));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(
        wire.metrics[0].value,
        Some(proto::metric::Value::BytesValue(vec![
            0x61, 0x62, 0x00, 0x00, 0x63, 0x00
        ]))
    );
}

#[test]
fn test_null_value_travels_as_is_null() {
    let payload = single_metric_payload(Metric::new("n", MetricDataType::Int32, Value::Null));
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();
    assert_eq!(wire.metrics[0].is_null, Some(true));
    assert_eq!(wire.metrics[0].value, None);

    let decoded = decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded.metrics[0].value, Value::Null);
    assert_eq!(decoded.metrics[0].data_type, MetricDataType::Int32);
}

#[test]
fn test_shape_mismatch_rejected() {
    let payload = single_metric_payload(Metric::new(
        "bad",
        MetricDataType::Int32,
        Value::Double(1.0),
    ));
    assert!(matches!(
        encode(&payload),
        Err(EncodeError::InvalidType { .. })
    ));
}

#[test]
fn test_unknown_datatype_rejected() {
    let payload = single_metric_payload(Metric::new(
        "u",
        MetricDataType::Unknown,
        Value::Int32(1),
    ));
    assert_eq!(encode(&payload), Err(EncodeError::UnknownType));
}

#[test]
fn test_decode_rejects_inconsistent_value_field() {
    // datatype says Int32 but only double_value is populated.
    let wire = proto::Payload {
        timestamp: Some(1),
        metrics: vec![proto::Metric {
            name: Some("m".to_string()),
            alias: None,
            timestamp: None,
            datatype: Some(MetricDataType::Int32.code()),
            is_historical: None,
            is_transient: None,
            is_null: None,
            metadata: None,
            properties: None,
            value: Some(proto::metric::Value::DoubleValue(1.0)),
        }],
        seq: None,
        uuid: None,
        body: None,
    };
    let bytes = wire.encode_to_vec();
    assert!(matches!(
        decode(bytes.as_slice()),
        Err(DecodeError::TypeMismatch { .. })
    ));
}

#[test]
fn test_decode_rejects_unknown_datatype_code() {
    let wire = proto::Payload {
        timestamp: None,
        metrics: vec![proto::Metric {
            name: Some("m".to_string()),
            alias: None,
            timestamp: None,
            datatype: Some(99),
            is_historical: None,
            is_transient: None,
            is_null: Some(true),
            metadata: None,
            properties: None,
            value: None,
        }],
        seq: None,
        uuid: None,
        body: None,
    };
    let bytes = wire.encode_to_vec();
    assert_eq!(
        decode(bytes.as_slice()),
        Err(DecodeError::UnknownType(99))
    );
}

#[test]
fn test_decode_rejects_garbage() {
    assert!(matches!(
        decode(&[0xff, 0xff, 0xff, 0xff][..]),
        Err(DecodeError::InvalidWire(_))
    ));
}

#[test]
fn test_file_merges_metadata() {
    let mut metadata = MetaData {
        md5: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
        ..MetaData::default()
    };
    metadata.file_name = Some("firmware.bin".to_string());

    let mut metric = Metric::new(
        "fw",
        MetricDataType::File,
        Value::File(File::new(
            Some("firmware.bin".to_string()),
            vec![0xde, 0xad],
        )),
    );
    metric.metadata = Some(MetaData {
        md5: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
        ..MetaData::default()
    });

    let payload = single_metric_payload(metric);
    let bytes = encode(&payload).unwrap();
    let wire = proto::Payload::decode(bytes.as_slice()).unwrap();

    // The file name is merged into existing metadata, not replacing it.
    let meta = wire.metrics[0].metadata.as_ref().unwrap();
    assert_eq!(meta.file_name.as_deref(), Some("firmware.bin"));
    assert_eq!(
        meta.md5.as_deref(),
        Some("d41d8cd98f00b204e9800998ecf8427e")
    );

    let decoded = decode(bytes.as_slice()).unwrap();
    assert_eq!(decoded.metrics[0].metadata.as_ref().unwrap(), &metadata);
    match &decoded.metrics[0].value {
        Value::File(file) => {
            assert_eq!(file.file_name.as_deref(), Some("firmware.bin"));
            assert_eq!(file.bytes, vec![0xde, 0xad]);
        }
        other => panic!("expected file value, got {other:?}"),
    }
}

#[test]
fn test_property_set_round_trip_preserves_order() {
    let mut inner = PropertySet::new();
    inner.insert(
        "unit",
        PropertyValue::new(PropertyDataType::String, Value::String("V".into())),
    );

    let mut props = PropertySet::new();
    props.insert(
        "engHigh",
        PropertyValue::new(PropertyDataType::Double, Value::Double(480.0)),
    );
    props.insert(
        "engLow",
        PropertyValue::new(PropertyDataType::Double, Value::Double(0.0)),
    );
    props.insert(
        "nested",
        PropertyValue::new(PropertyDataType::PropertySet, Value::PropertySet(inner)),
    );
    props.insert(
        "docs",
        PropertyValue::new(
            PropertyDataType::PropertySetList,
            Value::PropertySetList(vec![PropertySet::new()]),
        ),
    );
    props.insert(
        "missing",
        PropertyValue::new(PropertyDataType::Int32, Value::Null),
    );

    let metric = Metric::new("v", MetricDataType::Double, Value::Double(240.0))
        .with_properties(props.clone());
    let payload = single_metric_payload(metric);

    let decoded = round_trip(&payload);
    let got = decoded.metrics[0].properties.as_ref().unwrap();
    assert_eq!(got, &props);
    let keys: Vec<&str> = got.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["engHigh", "engLow", "nested", "docs", "missing"]);
}

#[test]
fn test_dataset_round_trip() {
    let mut ds = DataSet::new(
        vec!["name".into(), "value".into(), "ok".into()],
        vec![
            DataSetDataType::String,
            DataSetDataType::Double,
            DataSetDataType::Boolean,
        ],
    )
    .unwrap();
    ds.add_row(Row::new(vec![
        Value::String("pump".into()),
        Value::Double(3.5),
        Value::Boolean(true),
    ]))
    .unwrap();
    ds.add_row(Row::new(vec![
        Value::String("valve".into()),
        Value::Null,
        Value::Boolean(false),
    ]))
    .unwrap();

    let payload = single_metric_payload(Metric::new(
        "table",
        MetricDataType::DataSet,
        Value::DataSet(ds),
    ));
    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_dataset_rejects_column_type_mismatch() {
    let mut ds = DataSet::new(vec!["v".into()], vec![DataSetDataType::Int32]).unwrap();
    ds.add_row(Row::new(vec![Value::String("oops".into())]))
        .unwrap();

    let payload = single_metric_payload(Metric::new(
        "table",
        MetricDataType::DataSet,
        Value::DataSet(ds),
    ));
    assert!(matches!(
        encode(&payload),
        Err(EncodeError::InvalidType { .. })
    ));
}

#[test]
fn test_template_round_trip() {
    let mut definition = Template::definition();
    definition.set_version("1.1");
    definition.add_metric(Metric::new(
        "Setpoint",
        MetricDataType::Double,
        Value::Double(72.0),
    ));
    definition.add_parameter(Parameter::new(
        "Scale",
        ParameterDataType::Float,
        Value::Float(1.0),
    ));

    let mut instance = Template::instance("Motor");
    instance.add_metric(Metric::new(
        "Setpoint",
        MetricDataType::Double,
        Value::Double(68.5),
    ));

    let mut payload = SparkplugBPayload::new().with_timestamp(5);
    payload.add_metric(Metric::new(
        "Motor",
        MetricDataType::Template,
        Value::Template(definition),
    ));
    payload.add_metric(Metric::new(
        "Motor 1",
        MetricDataType::Template,
        Value::Template(instance),
    ));

    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_template_ref_discipline() {
    // Definition with a ref is rejected.
    let mut bad_def = Template::definition();
    bad_def.set_template_ref(Some("X"));
    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Template,
        Value::Template(bad_def),
    ));
    assert!(matches!(
        encode(&payload),
        Err(EncodeError::InvalidTemplate(_))
    ));

    // Instance without a ref is rejected.
    let bare = Template::default();
    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Template,
        Value::Template(bare),
    ));
    assert!(matches!(
        encode(&payload),
        Err(EncodeError::InvalidTemplate(_))
    ));
}

#[test]
fn test_parameter_type_mismatch_rejected() {
    let mut definition = Template::definition();
    definition.add_parameter(Parameter::new(
        "Enabled",
        ParameterDataType::Boolean,
        Value::Int32(5),
    ));

    let payload = single_metric_payload(Metric::new(
        "t",
        MetricDataType::Template,
        Value::Template(definition),
    ));
    assert!(matches!(
        encode(&payload),
        Err(EncodeError::InvalidType { .. })
    ));
}

#[test]
fn test_nested_template_in_template() {
    let mut inner = Template::instance("Inner");
    inner.add_metric(Metric::new("x", MetricDataType::Int32, Value::Int32(3)));

    let mut outer = Template::definition();
    outer.add_metric(Metric::new(
        "inner",
        MetricDataType::Template,
        Value::Template(inner),
    ));

    let payload = single_metric_payload(Metric::new(
        "outer",
        MetricDataType::Template,
        Value::Template(outer),
    ));
    assert_eq!(round_trip(&payload), payload);
}

#[test]
fn test_bd_seq_helper_round_trip() {
    let payload = SparkplugBPayload::birth_skeleton(1_700_000_000_000, 0, 7);
    let decoded = round_trip(&payload);
    assert_eq!(decoded.bd_seq(), Some(7));
    assert_eq!(decoded.seq, Some(0));
    assert_eq!(decoded.metrics[0].name.as_deref(), Some("bdSeq"));
}
