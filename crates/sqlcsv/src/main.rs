use std::env;
use std::io::{ErrorKind, stderr};
use std::path::PathBuf;
use std::process::exit;

use chrono::Utc;
use serde::Serialize;
use tracing_appender::{
    non_blocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt};

use sqlcsv_core::{DataSourceOptions, ExportConfig, create_connection, logs_dir};

mod export;

const USAGE: &str = "用法: sqlcsv [-c <配置文件>] [-d <导出目录>]";

/// 命令行参数
#[derive(Debug, PartialEq)]
pub struct Args {
    pub config: PathBuf,
    pub dest: PathBuf,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("sqlcsv.yml"),
            dest: PathBuf::from("export"),
        }
    }
}

/// 解析 `-c <file>` 与 `-d <dir>`，`Ok(None)` 表示只需打印用法
fn parse_args<I>(args: I) -> Result<Option<Args>, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                parsed.config = args.next().map(PathBuf::from).ok_or("-c 缺少配置文件路径")?;
            }
            "-d" | "--dest" => {
                parsed.dest = args.next().map(PathBuf::from).ok_or("-d 缺少导出目录")?;
            }
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("未知参数: {}", other)),
        }
    }
    Ok(Some(parsed))
}

/// 进度输出消息（写入 stdout 的 JSON Lines）
#[derive(Debug, Serialize)]
pub struct ProgressMessage {
    kind: MessageKind,
    at: String,
    data: serde_json::Value,
}

impl ProgressMessage {
    pub fn new(
        kind: MessageKind,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            at: Utc::now().to_rfc3339(),
            data,
        }
    }
}

/// 消息类型
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Progress,
    Status,
    Error,
    Completed,
}

/// 初始化日志：控制台输出到 stderr，文件按天滚动写入 ~/.sqlcsv/logs
fn init_logging() -> Option<non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("sqlcsv")
        .filename_suffix("log")
        .build(logs_dir())
        .ok()
        .map(non_blocking);
    let (file_layer, guard) = match file {
        Some((writer, guard)) => (Some(layer().with_writer(writer).with_ansi(false)), Some(guard)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer().with_writer(stderr))
        .with(file_layer)
        .init();

    guard
}

/// 加载当前目录下的 .env，文件不存在时忽略
fn load_dotenv() -> Result<(), dotenv::Error> {
    match dotenv::from_path(".env") {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn fatal(message: &str) -> ! {
    tracing::error!("{}", message);
    print_error("fatal", message);
    exit(1);
}

fn main() {
    // 1. 解析命令行参数
    let args = match parse_args(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            eprintln!("{}", USAGE);
            return;
        }
        Err(msg) => {
            print_error("fatal", &msg);
            eprintln!("{}", USAGE);
            exit(2);
        }
    };

    // 2. 初始化日志系统
    let _log_guard = init_logging();
    tracing::info!("sqlcsv 启动，config={:?}, dest={:?}", args.config, args.dest);

    // 3. 读取数据库配置（.env）
    if let Err(e) = load_dotenv() {
        fatal(&format!("加载 .env 失败: {}", e));
    }

    // 4. 读取并校验导出配置
    let config = match ExportConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => fatal(&format!("加载导出配置失败: {}", e)),
    };
    if let Err(e) = config.validate() {
        fatal(&e.to_string());
    }
    tracing::info!("导出配置解析成功，共 {} 张表", config.tables.len());

    // 5. 建立数据库连接
    let datasource = match DataSourceOptions::from_env() {
        Ok(ds) => ds,
        Err(e) => fatal(&format!("数据库配置错误: {}", e)),
    };
    tracing::info!("正在连接数据库 {} ...", datasource.endpoint());
    let mut session = match create_connection(&datasource) {
        Ok(s) => s,
        Err(e) => fatal(&format!("数据库连接失败: {}", e)),
    };
    tracing::info!("数据库连接成功");

    // 6. 逐表导出
    if let Err(e) = export::run(session.as_mut(), &config, &args.dest) {
        fatal(&format!("导出失败: {}", e));
    }
}

pub fn print_error(
    severity: &str,
    message: &str,
) {
    print_progress(ProgressMessage::new(
        MessageKind::Error,
        serde_json::json!({
            "severity": severity,
            "message": message,
        }),
    ));
}

pub fn print_status(data: serde_json::Value) {
    print_progress(ProgressMessage::new(MessageKind::Status, data));
}

pub fn print_completed(data: serde_json::Value) {
    print_progress(ProgressMessage::new(MessageKind::Completed, data));
}

pub fn print_progress(msg: ProgressMessage) {
    if let Ok(json) = serde_json::to_string(&msg) {
        println!("{}", json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_without_flags() {
        assert_eq!(parse_args(args(&[])).unwrap(), Some(Args::default()));
    }

    #[test]
    fn config_and_dest_flags() {
        let parsed = parse_args(args(&["-c", "conf/prod.yml", "-d", "/tmp/out"])).unwrap().unwrap();
        assert_eq!(parsed.config, PathBuf::from("conf/prod.yml"));
        assert_eq!(parsed.dest, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn missing_value_and_unknown_flag() {
        assert!(parse_args(args(&["-c"])).is_err());
        assert_eq!(parse_args(args(&["--verbose"])).unwrap_err(), "未知参数: --verbose");
    }

    #[test]
    fn help_requests_usage() {
        assert_eq!(parse_args(args(&["-h"])).unwrap(), None);
    }

    #[test]
    fn progress_message_shape() {
        let msg = ProgressMessage::new(MessageKind::Completed, serde_json::json!({ "rows": 3 }));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "completed");
        assert_eq!(value["data"]["rows"], 3);
        assert!(value["at"].as_str().is_some());
    }
}
