//! # 示例应用程序
//!
//! 演示如何使用 Lorn ADSP 动态配置服务：加载配置、读取、校验以及热重载

use anyhow::{bail, Context};
use clap::Parser;
use config_abstractions::{ConfigProviderExt, FnEventListener, TracingLogger};
use config_impl::{
    ConfigService, DynamicConfigOptions, FieldRule, PipelineState, SchemaValidator, ValueType,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn ADSP 动态配置示例应用")]
struct Args {
    /// 配置文件路径（.js 或 .json）
    #[arg(short, long, default_value = "config/config.js")]
    config: PathBuf,

    /// `.env` 与 package.json 所在目录，默认为配置文件所在目录
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// 额外打印的配置键
    #[arg(short, long)]
    key: Vec<String>,

    /// 输出配置加载的调试信息
    #[arg(long)]
    debug: bool,

    /// 加载后立即退出，不监控文件变更
    #[arg(long)]
    once: bool,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("启动 Lorn ADSP 动态配置示例应用");

    let service = build_service(&args)?;
    if service.pipeline_state() != PipelineState::Committed {
        bail!("配置加载失败: {}", args.config.display());
    }
    info!("应用 {} {}", service.app_name(), service.version());

    demonstrate_configuration(&service, &args.key)?;

    if args.once {
        service.close_watch();
        return Ok(());
    }

    let port = service.create_proxy_or("app.port", AppConfig::default().port);
    service.register_listener(Arc::new(FnEventListener::new("port-reporter", move || {
        info!("配置已重载，当前端口: {}", port());
    })));

    info!("正在监控 {}，按 Ctrl+C 退出", args.config.display());
    tokio::signal::ctrl_c().await?;

    info!("收到退出信号，正在关闭应用");
    service.close_watch();
    info!("应用已关闭");
    Ok(())
}

/// 构建配置服务
fn build_service(args: &Args) -> anyhow::Result<ConfigService> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => args
            .config
            .parent()
            .map(PathBuf::from)
            .context("无法确定配置文件所在目录")?,
    };

    let schema = SchemaValidator::new("ExampleAppSchema")
        .field("app.name", FieldRule::new().required().of_type(ValueType::String))
        .field(
            "app.port",
            FieldRule::new()
                .of_type(ValueType::Integer)
                .between(1.0, 65535.0)
                .with_default(8080),
        )
        .field(
            "database.host",
            FieldRule::new().of_type(ValueType::String).with_default("localhost"),
        );

    let options = DynamicConfigOptions::new()
        .with_config_file(&args.config)
        .with_root_folder(root)
        .with_debug(args.debug)
        .with_logger(Arc::new(TracingLogger))
        .with_validation_schema(Arc::new(schema))
        .with_validation_callback(|e| warn!("配置校验未通过，保留当前配置: {}", e))
        .with_error_callback(|e| error!("配置加载失败: {}", e));

    Ok(ConfigService::from_options(options))
}

/// 演示配置获取
fn demonstrate_configuration(service: &ConfigService, keys: &[String]) -> anyhow::Result<()> {
    info!("演示配置获取功能");

    let app: AppConfig = service.get("app").unwrap_or_else(|| {
        info!("未配置 app 节，使用默认配置");
        AppConfig::default()
    });
    info!("应用配置: {:?}", app);

    match service.get_or_fail::<DatabaseConfig, _>("database") {
        Ok(config) => info!("数据库配置: {:?}", config),
        Err(e) => info!("获取数据库配置失败，使用默认配置: {}", e),
    }

    let example: ExampleServiceConfig =
        service.get_or("services.exampleService", ExampleServiceConfig::default());
    info!("示例服务配置: {:?}", example);

    for key in keys {
        match service.get_value(key.as_str()) {
            Some(value) => info!("{} = {}", key, serde_json::to_string_pretty(&value)?),
            None => warn!("{} 未配置", key),
        }
    }
    Ok(())
}

// 示例配置结构

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// 应用名称
    pub name: String,
    /// 应用版本
    pub version: String,
    /// 监听端口
    pub port: u16,
    /// 工作线程数
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_worker_threads() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "example-app".to_string(),
            version: "0.1.0".to_string(),
            port: 8080,
            worker_threads: default_worker_threads(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// 数据库主机
    pub host: String,
    /// 数据库端口
    pub port: u16,
    /// 数据库名称
    pub database: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 示例服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleServiceConfig {
    /// 是否启用
    pub enabled: bool,
    /// 超时时间（秒）
    pub timeout_seconds: u64,
    /// 重试次数
    pub retry_count: u32,
}

impl Default for ExampleServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 30,
            retry_count: 3,
        }
    }
}
