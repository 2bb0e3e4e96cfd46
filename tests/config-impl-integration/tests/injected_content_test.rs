//! 基于注入内容的集成测试
use config_abstractions::{ConfigEvent, ConfigProvider, ConfigProviderExt, EnvironmentStore, FnEventListener};
use config_impl::{
    ConfigFileFormat, ConfigService, DynamicConfigOptions, FieldRule, FileLoader, InMemoryEnvironment,
    InjectedContent, PipelineState, SchemaValidator, ValueType,
};
use infrastructure_common::ConfigError;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PKG_CONTENT: &str = r#"{
    "name": "dynamic-config-demo",
    "author": "developer",
    "version": "1.2.30",
    "repository": { "type": "git", "url": "https://example.com/demo.git" }
}"#;

fn service_with(options: DynamicConfigOptions, content: InjectedContent) -> ConfigService {
    ConfigService::with_environment(
        options,
        FileLoader::injected(content),
        Arc::new(InMemoryEnvironment::new()),
    )
}

#[test]
fn test_basic_values_from_script() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("exports.default = () => ({ps: 'string', pn: 10, pb: true})", ConfigFileFormat::Script),
    );

    assert_eq!(service.get::<String, _>("ps").as_deref(), Some("string"));
    assert_eq!(service.get::<i64, _>("pn"), Some(10));
    assert_eq!(service.get::<bool, _>("pb"), Some(true));
    assert!(service.get_value("unknownKey").is_none());
    assert_eq!(service.get_or("unknownKey", "x".to_string()), "x");
}

#[test]
fn test_nested_levels() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("(() => ({l1: {l2: {l3: 'L3'}, l2b: 'L2B'}}))()", ConfigFileFormat::Script),
    );

    assert_eq!(service.get::<String, _>("l1.l2b").as_deref(), Some("L2B"));
    assert_eq!(service.get_value("l1.l2"), Some(json!({"l3": "L3"})));
    assert_eq!(service.get::<String, _>(["l1", "l2", "l3"]).as_deref(), Some("L3"));
}

#[test]
fn test_get_or_fail() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new(r#"{"db": {"port": 5432}}"#, ConfigFileFormat::Json),
    );

    assert_eq!(service.get_or_fail::<u16, _>("db.port").unwrap(), 5432);
    let err = service.get_or_fail::<String, _>("db.host").unwrap_err();
    assert_eq!(err.to_string(), "key db.host not found in the configuration");
}

#[test]
fn test_typed_section_binding() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        host: String,
        port: u16,
    }

    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new(r#"{"database": {"host": "db", "port": 5432}}"#, ConfigFileFormat::Json),
    );

    let db: Database = service.get_or_fail("database").unwrap();
    assert_eq!(db, Database { host: "db".to_string(), port: 5432 });
}

#[test]
fn test_env_file_values_populate_environment() {
    let env = Arc::new(InMemoryEnvironment::new());
    let service = ConfigService::with_environment(
        DynamicConfigOptions::default(),
        FileLoader::injected(
            InjectedContent::new("{}", ConfigFileFormat::Json).with_env("KEY=VALUE\nOTHER_KEY=42\n"),
        ),
        env.clone(),
    );

    assert_eq!(env.get("KEY").as_deref(), Some("VALUE"));
    assert_eq!(env.get("OTHER_KEY").as_deref(), Some("42"));
    assert!(env.get("NOT_IN_FILE").is_none());
    assert_eq!(service.pipeline_state(), PipelineState::Committed);
}

#[test]
fn test_env_and_package_substitution() {
    let content = r#"{
        "env": "{{ENV_KEY}}",
        "name": "{{pkg.name}}",
        "author": "{{pkg.author}}",
        "repo": "{{pkg.repository.url}}",
        "missing": "{{ENV_UNDEFINED_VARIABLE}}"
    }"#;
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new(content, ConfigFileFormat::Json)
            .with_env("KEY=VALUE\n")
            .with_package(PKG_CONTENT),
    );

    assert_eq!(service.get::<String, _>("env").as_deref(), Some("VALUE"));
    assert_eq!(service.get::<String, _>("name").as_deref(), Some("dynamic-config-demo"));
    assert_eq!(service.get::<String, _>("author").as_deref(), Some("developer"));
    assert_eq!(service.get::<String, _>("repo").as_deref(), Some("https://example.com/demo.git"));
    assert_eq!(
        service.get::<String, _>("missing").as_deref(),
        Some("{{ENV_UNDEFINED_VARIABLE}}")
    );
    assert_eq!(service.app_name(), "dynamic-config-demo");
    assert_eq!(service.version(), "1.2.30");
}

#[test]
fn test_substitution_happens_before_parsing() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("{port: {{ENV_PORT}}, debug: {{ENV_DEBUG}}}", ConfigFileFormat::Script)
            .with_env("PORT=8080\nDEBUG=true\n"),
    );

    assert_eq!(service.get::<u16, _>("port"), Some(8080));
    assert_eq!(service.get::<bool, _>("debug"), Some(true));
}

#[test]
fn test_absent_package_metadata() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("{}", ConfigFileFormat::Json),
    );

    assert_eq!(service.app_name(), "<unknown>");
    assert_eq!(service.version(), "<unknown>");
    assert!(service.package_info().field("author").is_none());
}

#[test]
fn test_unparsable_package_metadata_is_not_fatal() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new(r#"{"a": 1}"#, ConfigFileFormat::Json).with_package("{ broken"),
    );

    assert_eq!(service.app_name(), "<unknown>");
    assert_eq!(service.get::<i64, _>("a"), Some(1));
    assert_eq!(service.loader().exit_count(), 0);
}

#[test]
fn test_load_factories_only() {
    let options = DynamicConfigOptions::default()
        .with_load(|| Some(json!({"server": {"port": 3000, "host": "{{ENV_HOST}}"}})))
        .with_load(|| Some(json!({"server": {"port": 4000}})));
    let service = service_with(
        options,
        InjectedContent::new("", ConfigFileFormat::None).with_env("HOST=0.0.0.0\n"),
    );

    assert_eq!(service.get::<u16, _>("server.port"), Some(4000));
    assert_eq!(service.get::<String, _>("server.host").as_deref(), Some("0.0.0.0"));
}

#[test]
fn test_factory_without_content_terminates() {
    let service = service_with(
        DynamicConfigOptions::default().with_load(|| None),
        InjectedContent::new("{}", ConfigFileFormat::Json),
    );

    assert_eq!(service.loader().exit_count(), 1);
    assert_eq!(service.pipeline_state(), PipelineState::Failed);
}

#[test]
fn test_unsupported_format_without_callback_terminates_once() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("a: 1", ConfigFileFormat::Unsupported),
    );

    assert_eq!(service.loader().exit_count(), 1);
    assert!(service.snapshot().is_empty());
}

#[test]
fn test_unsupported_format_with_callback_never_terminates() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let service = service_with(
        DynamicConfigOptions::default().with_error_callback(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }),
        InjectedContent::new("a: 1", ConfigFileFormat::Unsupported),
    );

    assert_eq!(service.loader().exit_count(), 0);
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Unsupported config file type - only .js and JSON files are supported"));
}

#[test]
fn test_injected_load_error_goes_to_callback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let service = service_with(
        DynamicConfigOptions::default().with_error_callback(move |e| {
            assert!(matches!(e, ConfigError::InjectedLoadError { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        }),
        InjectedContent::new("{}", ConfigFileFormat::Json).with_config_error("file not found"),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.loader().exit_count(), 0);
}

#[test]
fn test_strict_json_rejects_comments() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _service = service_with(
        DynamicConfigOptions::default().with_error_callback(move |e| {
            assert!(matches!(e, ConfigError::ParseError { format: "json", .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        }),
        InjectedContent::new("{\"a\": 1, // comment\n}", ConfigFileFormat::Json),
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_validation_applies_defaults() {
    let schema = SchemaValidator::new("AppSchema")
        .field("port", FieldRule::new().of_type(ValueType::Integer).with_default(3000))
        .field("name", FieldRule::new().required().of_type(ValueType::String));
    let service = service_with(
        DynamicConfigOptions::default().with_validation_schema(Arc::new(schema)),
        InjectedContent::new(r#"{"name": "svc"}"#, ConfigFileFormat::Json),
    );

    assert_eq!(service.get::<u16, _>("port"), Some(3000));
}

#[test]
fn test_validation_failure_without_callback_is_fatal() {
    let schema = SchemaValidator::new("AppSchema").field("name", FieldRule::new().required());
    let service = service_with(
        DynamicConfigOptions::default().with_validation_schema(Arc::new(schema)),
        InjectedContent::new("{}", ConfigFileFormat::Json),
    );

    assert_eq!(service.loader().exit_count(), 1);
}

#[test]
fn test_validation_failure_with_callback_does_not_commit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let schema = SchemaValidator::new("AppSchema").field("name", FieldRule::new().required());
    let service = service_with(
        DynamicConfigOptions::default()
            .with_validation_schema(Arc::new(schema))
            .with_validation_callback(move |e| {
                assert!(matches!(e, ConfigError::ValidationFailed { .. }));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        InjectedContent::new(r#"{"other": 1}"#, ConfigFileFormat::Json),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.loader().exit_count(), 0);
    assert!(service.get_value("other").is_none());
}

#[tokio::test]
async fn test_force_reload_emits_reloaded_once() {
    let version = Arc::new(AtomicUsize::new(1));
    let source = version.clone();
    let options = DynamicConfigOptions::default()
        .with_load(move || Some(json!({"version": source.load(Ordering::SeqCst), "stable": true})));
    let service = service_with(options, InjectedContent::new("", ConfigFileFormat::None));

    let proxy = service.create_proxy::<usize, _>("version");
    let listener_calls = Arc::new(AtomicUsize::new(0));
    let counter = listener_calls.clone();
    service.register_listener(Arc::new(FnEventListener::new("counter", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })));
    let mut events = service.subscribe();

    assert_eq!(proxy(), Some(1));
    version.store(2, Ordering::SeqCst);
    assert!(service.force_reload(false).await);

    assert_eq!(events.recv().await.unwrap(), ConfigEvent::Reloaded);
    assert!(events.try_recv().is_err());
    assert_eq!(listener_calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy(), Some(2));
    assert_eq!(service.get::<bool, _>("stable"), Some(true));
}

#[tokio::test]
async fn test_initial_reload_emits_nothing() {
    let service = service_with(
        DynamicConfigOptions::default(),
        InjectedContent::new("{}", ConfigFileFormat::Json),
    );
    let mut events = service.subscribe();

    assert!(service.force_reload(true).await);
    assert!(events.try_recv().is_err());
}
