use chrono::{DateTime, TimeZone, Utc};
use domain::{MessageContext, RecordValue};
use m2i_transform::{
    Base64Decode, BuildError, Conversion, FieldSpec, FieldsSpec, JsonPath, RecordBuilder, Rule,
    ValueRef,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("valid time")
}

fn value_ref(text: &str) -> ValueRef {
    ValueRef::parse(text).expect("value ref")
}

fn fields(entries: &[(&str, FieldSpec)]) -> FieldsSpec {
    FieldsSpec::from_map(
        entries
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect(),
    )
}

fn ctx(topic: &str, payload: Value) -> MessageContext {
    MessageContext::new(topic, payload, 1717243200.0, 1)
}

#[test]
fn builds_record_with_fields_and_tags() {
    let mut tags = BTreeMap::new();
    tags.insert("id".to_string(), value_ref("$.topic[1]"));
    tags.insert("qos".to_string(), value_ref("$.qos"));
    let rule = Rule::new(
        "node/+/thermometer",
        value_ref("temperature"),
        fields(&[("value", FieldSpec::Value(value_ref("$.payload.value")))]),
    )
    .with_tags(tags);

    let mut ctx = ctx("node/kit-1/thermometer", json!({"value": 21.5}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");

    assert_eq!(record.measurement, "temperature");
    assert_eq!(record.time, "2024-06-01T12:00:00Z");
    assert_eq!(record.fields["value"], RecordValue::F64(21.5));
    assert_eq!(record.tags["id"], RecordValue::String("kit-1".to_string()));
    assert_eq!(record.tags["qos"], RecordValue::I64(1));
}

#[test]
fn embedded_timestamp_sets_record_time() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[("value", FieldSpec::Value(value_ref("$.payload.value")))]),
    );
    let mut ctx = ctx("t", json!({"timestamp": 1700000000, "value": 5}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");
    assert_eq!(record.time, "2023-11-14T22:13:20Z");
}

#[test]
fn measurement_from_path_and_missing_measurement() {
    let rule = Rule::new(
        "t",
        value_ref("$.payload.kind"),
        fields(&[("value", FieldSpec::Value(value_ref("$.payload.value")))]),
    );

    let mut ctx_ok = ctx("t", json!({"kind": "humidity", "value": 40}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx_ok, now())
        .expect("record");
    assert_eq!(record.measurement, "humidity");

    let mut ctx_missing = ctx("t", json!({"value": 40}));
    let err = RecordBuilder::default()
        .build(&rule, &mut ctx_missing, now())
        .expect_err("missing measurement");
    assert_eq!(err, BuildError::MissingMeasurement("$.payload.kind".to_string()));
}

#[test]
fn all_fields_unresolved_yields_no_record() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[
            ("a", FieldSpec::Value(value_ref("$.payload.a"))),
            ("b", FieldSpec::Value(value_ref("= JSON__payload__b * 2"))),
        ]),
    );
    let mut ctx = ctx("t", json!({"c": 1}));
    let err = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect_err("no fields");
    assert_eq!(err, BuildError::EmptyFields);
}

#[test]
fn partially_resolved_fields_are_kept() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[
            ("a", FieldSpec::Value(value_ref("$.payload.a"))),
            ("b", FieldSpec::Value(value_ref("$.payload.b"))),
        ]),
    );
    let mut ctx = ctx("t", json!({"a": 1}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");
    assert_eq!(record.fields.len(), 1);
    assert_eq!(record.fields["a"], RecordValue::I64(1));
}

#[test]
fn booltoint_typed_and_legacy_forms() {
    let typed = Rule::new(
        "t",
        value_ref("m"),
        fields(&[(
            "on",
            FieldSpec::Typed {
                value: value_ref("$.payload"),
                conversion: Conversion::from_name("booltoint"),
            },
        )]),
    );
    let legacy = Rule::new(
        "t",
        value_ref("m"),
        fields(&[
            ("value", FieldSpec::Value(value_ref("$.payload"))),
            ("type", FieldSpec::Value(ValueRef::literal("booltoint"))),
        ]),
    );

    for (payload, expected) in [(json!(true), 1), (json!(false), 0)] {
        let mut ctx_typed = ctx("t", payload.clone());
        let record = RecordBuilder::default()
            .build(&typed, &mut ctx_typed, now())
            .expect("record");
        assert_eq!(record.fields["on"], RecordValue::I64(expected));

        let mut ctx_legacy = ctx("t", payload);
        let record = RecordBuilder::default()
            .build(&legacy, &mut ctx_legacy, now())
            .expect("record");
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields["value"], RecordValue::I64(expected));
    }
}

#[test]
fn failed_conversion_drops_field() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[
            (
                "count",
                FieldSpec::Typed {
                    value: value_ref("$.payload.count"),
                    conversion: Conversion::Int,
                },
            ),
            ("raw", FieldSpec::Value(value_ref("$.payload.count"))),
        ]),
    );
    let mut ctx = ctx("t", json!({"count": "many"}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");
    assert!(!record.fields.contains_key("count"));
    assert_eq!(record.fields["raw"], RecordValue::String("many".to_string()));
}

#[test]
fn expression_field_doubles_payload_value() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[("value", FieldSpec::Value(value_ref("= JSON__payload__value * 2")))]),
    );
    let mut ctx = ctx("t", json!({"value": 10}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");
    assert_eq!(record.fields["value"], RecordValue::I64(20));
}

#[test]
fn fields_from_single_path() {
    let rule = Rule::new(
        "t",
        value_ref("m"),
        FieldsSpec::Path(JsonPath::parse("$.payload").expect("path")),
    );
    let mut ctx = ctx("t", json!({"temp": 20.5, "ok": true, "nested": {"x": 1}}));
    let record = RecordBuilder::default()
        .build(&rule, &mut ctx, now())
        .expect("record");
    assert_eq!(record.fields.len(), 2);
    assert_eq!(record.fields["temp"], RecordValue::F64(20.5));
    assert_eq!(record.fields["ok"], RecordValue::Bool(true));
}

#[test]
fn base64_side_channel_is_addressable() {
    let builder = RecordBuilder::new(Some(Base64Decode {
        source: value_ref("$.payload.data"),
        target: "frame".to_string(),
    }));
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[
            ("hex", FieldSpec::Value(value_ref("$.base64decoded.frame.hex"))),
            (
                "word",
                FieldSpec::Value(value_ref(
                    "= JSON__base64decoded__frame__raw__0 * 256 + JSON__base64decoded__frame__raw__1",
                )),
            ),
        ]),
    );
    // 0x01 0x02 0xff
    let mut ctx = ctx("t", json!({"data": "AQL/"}));
    let record = builder.build(&rule, &mut ctx, now()).expect("record");
    assert_eq!(record.fields["hex"], RecordValue::String("0102ff".to_string()));
    assert_eq!(record.fields["word"], RecordValue::I64(258));
}

#[test]
fn invalid_base64_leaves_context_untouched() {
    let builder = RecordBuilder::new(Some(Base64Decode {
        source: value_ref("$.payload.data"),
        target: "frame".to_string(),
    }));
    let rule = Rule::new(
        "t",
        value_ref("m"),
        fields(&[("v", FieldSpec::Value(value_ref("$.payload.v")))]),
    );
    let mut ctx = ctx("t", json!({"data": "***", "v": 1}));
    let record = builder.build(&rule, &mut ctx, now()).expect("record");
    assert_eq!(record.fields["v"], RecordValue::I64(1));
    assert!(!ctx.has_decoded("frame"));
}

#[test]
fn building_twice_is_stable() {
    let mut tags = BTreeMap::new();
    tags.insert("room".to_string(), value_ref("$.topic[1]"));
    let rule = Rule::new(
        "home/+/climate",
        value_ref("climate"),
        fields(&[
            ("t", FieldSpec::Value(value_ref("$.payload.t"))),
            ("f", FieldSpec::Value(value_ref("= JSON__payload__t * 9 / 5 + 32"))),
        ]),
    )
    .with_tags(tags);

    let builder = RecordBuilder::default();
    let mut first_ctx = ctx("home/kitchen/climate", json!({"t": 20}));
    let mut second_ctx = ctx("home/kitchen/climate", json!({"t": 20}));
    let first = builder.build(&rule, &mut first_ctx, now()).expect("record");
    let second = builder.build(&rule, &mut second_ctx, now()).expect("record");

    assert_eq!(first.measurement, second.measurement);
    assert_eq!(first.fields, second.fields);
    assert_eq!(first.tags, second.tags);
    assert_eq!(first.fields["f"], RecordValue::F64(68.0));
}
