use m2i_config::{AppConfig, ConfigError};
use m2i_forward::HttpMethod;
use m2i_transform::{Conversion, FieldSpec, FieldsSpec, ValueRef};
use std::time::Duration;

const FULL: &str = r#"
mqtt:
  host: 127.0.0.1
  username: user
  password: pass
influxdb:
  host: 127.0.0.1
  database: node
  timeout_seconds: 5
base64decode:
  source: $.payload.data
  target: frame
http:
  destination: http://hook.local/in
  action: PUT
  username: hook
  password: secret
points:
  - measurement: temperature
    topic: node/+/thermometer/+/temperature
    schedule: "*/5 * * * *"
    fields:
      value: $.payload
    tags:
      id: $.topic[1]
      channel: 3
    database: archive
    httpcontent:
      temp: $.payload
  - measurement: $.payload.kind
    topic: node/+/relay
    fields:
      value: $.payload.on
      type: booltoint
  - measurement: climate
    topic: home/#
    fields: $.payload
  - measurement: scaled
    topic: scale/+
    fields:
      raw:
        value: $.payload.raw
        type: int
      doubled: = JSON__payload__raw * 2
      constant: 7
"#;

#[test]
fn load_full_config() {
    let config = AppConfig::from_yaml_str(FULL).expect("config");

    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.username.as_deref(), Some("user"));
    assert_eq!(config.influxdb.port, 8086);
    assert_eq!(config.influxdb.username, "root");
    assert_eq!(config.influxdb.retries, 3);
    assert_eq!(config.influxdb.timeout, Some(Duration::from_secs(5)));

    let decode = config.base64decode.expect("base64decode");
    assert_eq!(decode.target, "frame");

    let http = config.http.expect("http");
    assert_eq!(http.method, Some(HttpMethod::Put));
    assert_eq!(http.destination, "http://hook.local/in");

    assert_eq!(config.rules.len(), 4);
    let first = &config.rules[0];
    assert_eq!(first.topic, "node/+/thermometer/+/temperature");
    assert!(first.schedule.is_some());
    assert_eq!(first.database.as_deref(), Some("archive"));
    assert_eq!(first.tags["channel"], ValueRef::literal("3"));
    assert!(first.http_content.as_ref().is_some_and(|c| c.contains_key("temp")));
}

#[test]
fn legacy_booltoint_and_field_forms() {
    let config = AppConfig::from_yaml_str(FULL).expect("config");

    match &config.rules[1].fields {
        FieldsSpec::Map(fields) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields["value"].conversion(), Some(&Conversion::BoolToInt));
        }
        other => panic!("unexpected fields: {:?}", other),
    }

    assert!(matches!(config.rules[2].fields, FieldsSpec::Path(_)));

    match &config.rules[3].fields {
        FieldsSpec::Map(fields) => {
            assert_eq!(fields["raw"].conversion(), Some(&Conversion::Int));
            assert!(matches!(
                fields["doubled"],
                FieldSpec::Value(ValueRef::Expression(_))
            ));
            assert_eq!(
                fields["constant"],
                FieldSpec::Typed {
                    value: ValueRef::literal("7"),
                    conversion: Conversion::Int,
                }
            );
        }
        other => panic!("unexpected fields: {:?}", other),
    }
}

#[test]
fn unknown_http_action_is_not_fatal() {
    let yaml = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
http: {destination: "http://hook.local", action: teleport}
points:
  - {measurement: m, topic: t, fields: {v: $.payload}}
"#;
    let config = AppConfig::from_yaml_str(yaml).expect("config");
    let http = config.http.expect("http");
    assert_eq!(http.method, None);
    assert_eq!(http.action, "teleport");
}

#[test]
fn rejects_invalid_configs() {
    let no_points = "mqtt: {host: broker}\ninfluxdb: {host: db, database: node}\npoints: []\n";
    assert!(matches!(
        AppConfig::from_yaml_str(no_points),
        Err(ConfigError::Missing(_))
    ));

    let bad_topic = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
points:
  - {measurement: m, topic: "a/#/b", fields: {v: $.payload}}
"#;
    match AppConfig::from_yaml_str(bad_topic) {
        Err(ConfigError::Invalid(location, _)) => assert_eq!(location, "points[0].topic"),
        other => panic!("unexpected result: {:?}", other.map(|c| c.rules.len())),
    }

    let bad_cron = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
points:
  - {measurement: m, topic: t, schedule: "61 * * * *", fields: {v: $.payload}}
"#;
    assert!(matches!(
        AppConfig::from_yaml_str(bad_cron),
        Err(ConfigError::Invalid(_, _))
    ));

    let bad_expr = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
points:
  - {measurement: m, topic: t, fields: {v: "= JSON__payload *"}}
"#;
    assert!(matches!(
        AppConfig::from_yaml_str(bad_expr),
        Err(ConfigError::Invalid(_, _))
    ));

    let unknown_key = "mqtt: {host: broker, hots: x}\ninfluxdb: {host: db, database: node}\npoints: []\n";
    assert!(matches!(
        AppConfig::from_yaml_str(unknown_key),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn load_applies_env_overrides() {
    let path = std::env::temp_dir().join(format!("m2i-config-{}.yaml", std::process::id()));
    std::fs::write(&path, FULL).expect("write config");

    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("M2I_MQTT_HOST", "broker.local");
        std::env::set_var("M2I_MQTT_PORT", "8883");
        std::env::set_var("M2I_INFLUXDB_PASSWORD", "hunter2");
    }

    let config = AppConfig::load(&path).expect("config");
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.influxdb.password, "hunter2");
    assert_eq!(config.influxdb.host, "127.0.0.1");
}

#[test]
fn missing_file_is_io_error() {
    assert!(matches!(
        AppConfig::from_path("/nonexistent/m2i.yaml"),
        Err(ConfigError::Io { .. })
    ));
}

#[test]
fn flow_style_paths_with_brackets_need_quotes() {
    // 流式映射中 `[` 是语法字符，带下标的路径必须加引号
    let unquoted = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
points:
  - {measurement: m, topic: t, fields: {v: $.payload}, tags: {id: $.topic[1]}}
"#;
    assert!(matches!(
        AppConfig::from_yaml_str(unquoted),
        Err(ConfigError::Yaml(_))
    ));

    let quoted = r#"
mqtt: {host: broker}
influxdb: {host: db, database: node}
points:
  - {measurement: m, topic: t, fields: {v: $.payload}, tags: {id: "$.topic[1]"}}
"#;
    let config = AppConfig::from_yaml_str(quoted).expect("config");
    assert_eq!(
        config.rules[0].tags["id"],
        ValueRef::parse("$.topic[1]").expect("path")
    );
}
