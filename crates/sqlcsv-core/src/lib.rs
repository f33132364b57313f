use std::path::Path;

use serde::{Deserialize, Serialize};

// 核心模块导出
pub mod config;
pub mod convert;
pub mod driver;
pub mod export;
pub mod query;
pub mod runner;
pub mod transform;

mod paths;

pub use config::{ConfigError, ExportConfig, TableOptions, TransformDecl};
pub use convert::{ConvertError, CsvConverter, RowConverter};
pub use driver::{
    Cell, DatabaseDriver, DatabaseSession, DriverError, QueryError, RowCursor, check_connection, create_connection,
};
pub use export::{ExportError, ExportSummary, PageProgress, TableExport, export_table};
pub use paths::{logs_dir, root_dir};
pub use query::build_query;
pub use runner::{RunError, RunEvent, RunReport, SkipReason, SkippedTable, run};
pub use transform::{BuildError, TransformRule};

/// 默认的 NULL 占位符
pub const DEFAULT_NULL_STRING: &str = "\\N";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceKind {
    MySQL,
    SQLite,
}

impl DataSourceKind {
    pub fn all() -> &'static [DataSourceKind] {
        &[DataSourceKind::MySQL, DataSourceKind::SQLite]
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataSourceKind::MySQL => "MySQL",
            DataSourceKind::SQLite => "SQLite",
        }
    }

    /// 按 `DB_DRIVER` 的取值匹配数据源类型（忽略大小写）
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.label().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MySQLOptions {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub use_tls: bool,
}

impl Default for MySQLOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: "3306".into(),
            username: "root".into(),
            password: "".into(),
            database: String::new(),
            use_tls: false,
        }
    }
}

impl MySQLOptions {
    pub fn endpoint(&self) -> String {
        let scheme = if self.use_tls { "mysqls" } else { "mysql" };
        let db = self.database.trim();
        if db.is_empty() {
            format!("{}://{}:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", scheme, self.host, self.port, db)
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SQLiteOptions {
    pub readonly: bool,
    pub filepath: String,
}

impl SQLiteOptions {
    pub fn endpoint(&self) -> String {
        let path = self.filepath.trim();
        if path.is_empty() {
            return "sqlite://<未配置文件>".into();
        }

        let name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);

        if self.readonly {
            format!("sqlite://{}?mode=ro", name)
        } else {
            format!("sqlite://{}", name)
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub enum DataSourceOptions {
    MySQL(MySQLOptions),
    SQLite(SQLiteOptions),
}

impl DataSourceOptions {
    pub fn kind(&self) -> DataSourceKind {
        match self {
            DataSourceOptions::MySQL(_) => DataSourceKind::MySQL,
            DataSourceOptions::SQLite(_) => DataSourceKind::SQLite,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            DataSourceOptions::MySQL(opts) => opts.endpoint(),
            DataSourceOptions::SQLite(opts) => opts.endpoint(),
        }
    }

    /// 从进程环境变量读取连接配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取连接配置
    ///
    /// 识别的键：`DB_DRIVER`（默认 mysql）、`DB_USER`、`DB_PASSWORD`、`DB_HOST`、
    /// `DB_PORT`、`DB_NAME`、`DB_TLS`，以及 SQLite 使用的 `DB_PATH`。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let driver = lookup("DB_DRIVER").filter(|v| !v.trim().is_empty());
        let kind = match driver {
            Some(name) => DataSourceKind::from_name(&name).ok_or(ConfigError::UnknownDriver(name))?,
            None => DataSourceKind::MySQL,
        };

        let options = match kind {
            DataSourceKind::MySQL => {
                let defaults = MySQLOptions::default();
                DataSourceOptions::MySQL(MySQLOptions {
                    host: lookup("DB_HOST").unwrap_or(defaults.host),
                    port: lookup("DB_PORT").unwrap_or(defaults.port),
                    username: lookup("DB_USER").unwrap_or(defaults.username),
                    password: lookup("DB_PASSWORD").unwrap_or(defaults.password),
                    database: lookup("DB_NAME").unwrap_or(defaults.database),
                    use_tls: lookup("DB_TLS").is_some_and(|v| is_truthy(&v)),
                })
            }
            DataSourceKind::SQLite => DataSourceOptions::SQLite(SQLiteOptions {
                readonly: true,
                filepath: lookup("DB_PATH").or_else(|| lookup("DB_NAME")).unwrap_or_default(),
            }),
        };
        Ok(options)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn mysql_is_the_default_driver() {
        let opts = DataSourceOptions::from_lookup(lookup(&[
            ("DB_USER", "app"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "db.local"),
            ("DB_PORT", "3307"),
            ("DB_NAME", "shop"),
        ]))
        .unwrap();

        assert_eq!(opts.kind(), DataSourceKind::MySQL);
        assert_eq!(opts.endpoint(), "mysql://db.local:3307/shop");
        match opts {
            DataSourceOptions::MySQL(mysql) => {
                assert_eq!(mysql.username, "app");
                assert_eq!(mysql.password, "secret");
                assert!(!mysql.use_tls);
            }
            DataSourceOptions::SQLite(_) => panic!("expected mysql options"),
        }
    }

    #[test]
    fn sqlite_reads_db_path() {
        let opts = DataSourceOptions::from_lookup(lookup(&[("DB_DRIVER", "sqlite"), ("DB_PATH", "/tmp/app.db")])).unwrap();
        assert_eq!(opts.kind(), DataSourceKind::SQLite);
        assert_eq!(opts.endpoint(), "sqlite://app.db?mode=ro");
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let err = DataSourceOptions::from_lookup(lookup(&[("DB_DRIVER", "oracle")]))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownDriver(name) if name == "oracle"));
    }
}
