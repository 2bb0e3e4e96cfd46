//! 基于真实文件系统的集成测试
use config_abstractions::{ConfigEvent, ConfigProvider, ConfigProviderExt, EnvironmentStore};
use config_impl::{
    ConfigService, DynamicConfigOptions, FileLoader, InMemoryEnvironment, PipelineState, ProcessEnvironment,
    RealSource,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn real_loader(options: &DynamicConfigOptions) -> FileLoader {
    FileLoader::real(RealSource {
        config_file: options.config_file.clone(),
        root_folder: options.root_folder.clone(),
        env_file_path: options.env_file_path.as_ref().map(|path| path.to_paths()),
    })
    .with_exit_handler(|_| {})
}

fn service_in(dir: &Path, config_name: &str, env: Arc<InMemoryEnvironment>) -> ConfigService {
    let options = DynamicConfigOptions::default()
        .with_config_file(dir.join(config_name))
        .with_root_folder(dir)
        .with_debounce(Duration::from_millis(20));
    let loader = real_loader(&options);
    ConfigService::with_environment(options, loader, env)
}

#[test]
fn test_loads_json_with_env_file_and_package() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "DB_HOST=db.local\nSHARED=base\n").unwrap();
    fs::write(dir.path().join(".development.env"), "SHARED=dev\n").unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{"name": "fs-app", "version": "0.4.0", "author": "developer"}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("config.json"),
        r#"{"db": {"host": "{{ENV_DB_HOST}}"}, "shared": "{{ENV_SHARED}}", "owner": "{{pkg.author}}"}"#,
    )
    .unwrap();

    let env = Arc::new(InMemoryEnvironment::new());
    let service = service_in(dir.path(), "config.json", env.clone());

    assert_eq!(service.get::<String, _>("db.host").as_deref(), Some("db.local"));
    assert_eq!(service.get::<String, _>("shared").as_deref(), Some("dev"));
    assert_eq!(service.get::<String, _>("owner").as_deref(), Some("developer"));
    assert_eq!(service.app_name(), "fs-app");
    assert_eq!(service.version(), "0.4.0");
    assert_eq!(env.get("SHARED").as_deref(), Some("dev"));
    assert!(!service.is_watching(), "no runtime, no watch");
}

#[test]
fn test_runtime_environment_wins_over_env_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "MODE=from-file\n").unwrap();
    fs::write(dir.path().join("config.js"), "module.exports = { mode: '{{ENV_MODE}}' }").unwrap();

    let env = Arc::new(InMemoryEnvironment::with_vars([("MODE", "from-runtime")]));
    let service = service_in(dir.path(), "config.js", env);

    assert_eq!(service.get::<String, _>("mode").as_deref(), Some("from-runtime"));
}

#[test]
fn test_process_environment_is_populated() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "CONFIG_IMPL_IT_PROCESS_KEY=process-value\n",
    )
    .unwrap();
    fs::write(dir.path().join("config.json"), r#"{"v": "{{ENV_CONFIG_IMPL_IT_PROCESS_KEY}}"}"#).unwrap();

    let options = DynamicConfigOptions::default()
        .with_config_file(dir.path().join("config.json"))
        .with_root_folder(dir.path());
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(ProcessEnvironment));

    assert_eq!(
        std::env::var("CONFIG_IMPL_IT_PROCESS_KEY").as_deref(),
        Ok("process-value")
    );
    assert_eq!(service.get::<String, _>("v").as_deref(), Some("process-value"));
    assert!(std::env::var("CONFIG_IMPL_IT_NEVER_DEFINED").is_err());
}

#[test]
fn test_env_file_path_override() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "SOURCE=default\n").unwrap();
    fs::write(dir.path().join("custom.env"), "SOURCE=custom\n").unwrap();
    fs::write(dir.path().join("config.json"), r#"{"source": "{{ENV_SOURCE}}"}"#).unwrap();

    let options = DynamicConfigOptions::default()
        .with_config_file(dir.path().join("config.json"))
        .with_root_folder(dir.path())
        .with_env_file_path("custom.env");
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(InMemoryEnvironment::new()));

    assert_eq!(service.get::<String, _>("source").as_deref(), Some("custom"));
}

#[test]
fn test_cargo_manifest_as_package_metadata() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("Cargo.toml"),
        "[package]\nname = \"rust-svc\"\nversion = \"2.0.1\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("config.json"), r#"{"banner": "{{pkg.name}}@{{pkg.version}}"}"#).unwrap();

    let service = service_in(dir.path(), "config.json", Arc::new(InMemoryEnvironment::new()));

    assert_eq!(service.get::<String, _>("banner").as_deref(), Some("rust-svc@2.0.1"));
}

#[test]
fn test_missing_root_folder_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.json"), r#"{"ok": true}"#).unwrap();

    let options = DynamicConfigOptions::default().with_config_file(dir.path().join("config.json"));
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(InMemoryEnvironment::new()));

    assert_eq!(service.get::<bool, _>("ok"), Some(true));
    assert_eq!(service.app_name(), "<unknown>");
    assert_eq!(service.loader().exit_count(), 0);
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.yaml"), "a: 1\n").unwrap();

    let service = service_in(dir.path(), "config.yaml", Arc::new(InMemoryEnvironment::new()));
    assert_eq!(service.loader().exit_count(), 1);
    assert_eq!(service.pipeline_state(), PipelineState::Failed);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let options = DynamicConfigOptions::default()
        .with_config_file(dir.path().join("config.yaml"))
        .with_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(InMemoryEnvironment::new()));
    assert_eq!(service.loader().exit_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_config_file_terminates() {
    let dir = TempDir::new().unwrap();
    let service = service_in(dir.path(), "absent.json", Arc::new(InMemoryEnvironment::new()));
    assert_eq!(service.loader().exit_count(), 1);
}

#[tokio::test]
async fn test_force_reload_after_file_change() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"level": "old", "keep": 1}"#).unwrap();

    let service = service_in(dir.path(), "config.json", Arc::new(InMemoryEnvironment::new()));
    assert!(service.is_watching());
    service.close_watch();
    assert!(!service.is_watching());

    let level = service.create_proxy::<String, _>("level");
    let mut events = service.subscribe();
    assert_eq!(level().as_deref(), Some("old"));

    fs::write(&config, r#"{"level": "new"}"#).unwrap();
    assert!(service.force_reload(false).await);

    assert_eq!(events.recv().await.unwrap(), ConfigEvent::Reloaded);
    assert!(events.try_recv().is_err());
    assert_eq!(level().as_deref(), Some("new"));
    assert!(service.get_value("keep").is_none());
}

#[tokio::test]
async fn test_file_watch_triggers_reload() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"counter": 1}"#).unwrap();

    let service = service_in(dir.path(), "config.json", Arc::new(InMemoryEnvironment::new()));
    let mut events = service.subscribe();
    assert!(service.is_watching());

    fs::write(&config, r#"{"counter": 2}"#).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("reload was not triggered")
        .unwrap();
    assert_eq!(event, ConfigEvent::Reloaded);
    assert_eq!(service.get::<u32, _>("counter"), Some(2));

    service.close_watch();
    service.close_watch();
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"value": "good"}"#).unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    let options = DynamicConfigOptions::default()
        .with_config_file(&config)
        .with_debounce(Duration::from_millis(10))
        .with_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(InMemoryEnvironment::new()));
    service.close_watch();

    fs::write(&config, "{ not json").unwrap();
    assert!(!service.force_reload(false).await);

    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(service.get::<String, _>("value").as_deref(), Some("good"));
    assert_eq!(service.pipeline_state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_writes_within_debounce_window_reload_once() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"counter": 1}"#).unwrap();

    let options = DynamicConfigOptions::default()
        .with_config_file(&config)
        .with_root_folder(dir.path())
        .with_debounce(Duration::from_millis(200));
    let loader = real_loader(&options);
    let service = ConfigService::with_environment(options, loader, Arc::new(InMemoryEnvironment::new()));
    let mut events = service.subscribe();
    assert!(service.is_watching());

    fs::write(&config, r#"{"counter": 2}"#).unwrap();
    fs::write(&config, r#"{"counter": 3}"#).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("reload was not triggered")
        .unwrap();
    assert_eq!(event, ConfigEvent::Reloaded);
    assert_eq!(service.get::<u32, _>("counter"), Some(3));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(service.snapshot().generation(), 2);

    service.close_watch();
}
