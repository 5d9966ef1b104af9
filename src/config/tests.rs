use super::*;
use serde_json::json;

fn sample_json() -> SerdeValue {
    json!({
        "apiKey": "AIzaSyTest",
        "authDomain": "demo.firebaseapp.com",
        "projectId": "demo",
        "storageBucket": "demo.appspot.com",
        "messagingSenderId": "1234567890",
        "appId": "1:1234567890:web:abc",
        "measurementId": "G-XYZ"
    })
}

#[test]
fn test_parse_valid_config() {
    let config = ProjectConfig::parse(&sample_json().to_string()).unwrap();
    assert_eq!(config.project_id, "demo");
    assert_eq!(config.measurement_id.as_deref(), Some("G-XYZ"));
}

#[test]
fn test_each_missing_required_field_is_rejected() {
    for field in REQUIRED_FIELDS {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove(field);

        match ProjectConfig::from_json(value) {
            Err(ConfigError::MissingFields(missing)) => assert_eq!(missing, vec![field]),
            other => panic!("expected missing {}, got {:?}", field, other),
        }
    }
}

#[test]
fn test_empty_and_null_fields_count_as_missing() {
    let mut value = sample_json();
    value["apiKey"] = json!("");
    value["appId"] = SerdeValue::Null;

    let err = ProjectConfig::from_json(value).unwrap_err();
    assert_eq!(err.to_string(), "Missing required fields: apiKey, appId");
}

#[test]
fn test_invalid_inputs() {
    assert!(matches!(ProjectConfig::parse("  "), Err(ConfigError::Empty)));
    assert!(matches!(
        ProjectConfig::parse("{not json"),
        Err(ConfigError::InvalidJson(_))
    ));
    assert!(matches!(
        ProjectConfig::parse("[1, 2]"),
        Err(ConfigError::NotAnObject)
    ));
}

#[test]
fn test_export_and_reimport_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(EXPORT_FILE_NAME);

    let original = ProjectConfig::from_json(sample_json()).unwrap();
    original.export_to(&path).unwrap();

    let reloaded = ProjectConfig::from_file(&path).unwrap();
    assert_eq!(reloaded, original);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  \"apiKey\": \"AIzaSyTest\""));
}

#[test]
fn test_round_trip_without_optional_field() {
    let mut value = sample_json();
    value.as_object_mut().unwrap().remove("measurementId");
    let original = ProjectConfig::from_json(value).unwrap();

    let reparsed = ProjectConfig::parse(&original.to_pretty_json().unwrap()).unwrap();
    assert_eq!(reparsed, original);
    assert!(!original.to_pretty_json().unwrap().contains("measurementId"));
}

#[test]
fn test_env_loader() {
    let inline = sample_json().to_string();
    let config = ProjectConfig::from_lookup(|name| {
        (name == "FIREBASE_CONFIG").then(|| inline.clone())
    })
    .unwrap()
    .unwrap();
    assert_eq!(config.app_id, "1:1234567890:web:abc");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dev.json");
    std::fs::write(&path, sample_json().to_string()).unwrap();
    let path_str = path.to_string_lossy().to_string();
    let config = ProjectConfig::from_lookup(|name| {
        (name == "FIREBASE_CONFIG_FILE").then(|| path_str.clone())
    })
    .unwrap();
    assert!(config.is_some());

    assert!(ProjectConfig::from_lookup(|_| None).unwrap().is_none());
}

#[test]
fn test_set_field() {
    let mut config = ProjectConfig::from_json(sample_json()).unwrap();
    config.set_field("projectId", "other").unwrap();
    assert_eq!(config.project_id, "other");
    config.set_field("databaseURL", "https://demo.firebaseio.com").unwrap();
    assert!(matches!(
        config.set_field(" ", "x"),
        Err(ConfigError::BlankField)
    ));

    let entries = config.entries();
    assert_eq!(entries.len(), 8);
    assert_eq!(
        entries[7],
        ("databaseURL", "https://demo.firebaseio.com".to_string())
    );
}

#[test]
fn test_extra_fields_survive_export() {
    let mut value = sample_json();
    value["databaseURL"] = json!("https://demo.firebaseio.com");
    value["locationId"] = json!("us-central");

    let config = ProjectConfig::from_json(value).unwrap();
    assert_eq!(
        config.extra.get("databaseURL"),
        Some(&json!("https://demo.firebaseio.com"))
    );

    let exported = config.to_pretty_json().unwrap();
    assert!(exported.contains("\"databaseURL\": \"https://demo.firebaseio.com\""));
    let database_at = exported.find("databaseURL").unwrap();
    let location_at = exported.find("locationId").unwrap();
    assert!(database_at < location_at);

    let reparsed = ProjectConfig::parse(&exported).unwrap();
    assert_eq!(reparsed, config);
}
