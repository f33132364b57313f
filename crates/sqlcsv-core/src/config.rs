use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::DEFAULT_NULL_STRING;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件 {} 失败: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("解析配置文件失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("表 {table} 不能同时设置 \"limit\" 和 \"chunk\"")]
    LimitAndChunk { table: String },

    #[error("不支持的数据库驱动: {0}")]
    UnknownDriver(String),
}

/// 导出配置文件
///
/// ```yaml
/// null_string: "\\N"
/// tables:
///   users:
///     transform:
///       email: { type: string, value: "nobody@example.com" }
///       token: "md5(`token`)"
///     where: "deleted_at is null"
///     chunk: 1000
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// NULL 在 CSV 中的占位符
    #[serde(default = "default_null_string")]
    pub null_string: String,
    /// 按表名排序，保证每次运行的导出顺序一致
    #[serde(default, deserialize_with = "tables_or_default")]
    pub tables: BTreeMap<String, TableOptions>,
}

fn default_null_string() -> String {
    DEFAULT_NULL_STRING.to_string()
}

/// 单表导出选项
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableOptions {
    #[serde(default)]
    pub transform: BTreeMap<String, TransformDecl>,
    #[serde(default, rename = "where")]
    pub filter: Option<String>,
    /// 0 表示不限制，与 `chunk` 互斥
    #[serde(default)]
    pub limit: u64,
    /// 0 表示不分页，与 `limit` 互斥
    #[serde(default)]
    pub chunk: u64,
}

impl TableOptions {
    /// 非空的 where 条件
    pub fn predicate(&self) -> Option<&str> {
        self.filter.as_deref().filter(|p| !p.trim().is_empty())
    }
}

/// 配置文件中某列的转换声明（未校验）
///
/// 声明在构建查询时才解析为 [`crate::TransformRule`]，
/// 因此一条错误的规则只会导致所在的表被跳过。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TransformDecl {
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        value: serde_yaml::Value,
        #[serde(default)]
        args: Vec<serde_yaml::Value>,
    },
    Alias(serde_yaml::Value),
}

/// 表名后不写任何选项时（`users:`）等同于默认选项
fn tables_or_default<'de, D>(deserializer: D) -> Result<BTreeMap<String, TableOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    let tables: Option<BTreeMap<String, Option<TableOptions>>> = Option::deserialize(deserializer)?;
    Ok(tables
        .unwrap_or_default()
        .into_iter()
        .map(|(name, opts)| (name, opts.unwrap_or_default()))
        .collect())
}

impl ExportConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 在任何导出开始前校验所有表
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (table, opts) in &self.tables {
            if opts.limit != 0 && opts.chunk != 0 {
                return Err(ConfigError::LimitAndChunk { table: table.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tables:
  users:
    transform:
      email:
        type: string
        value: nobody@example.com
      nick:
        type: preset
        value: if_not_empty
        args: ["`nick`", "`name`"]
      token: "md5(`token`)"
    where: "deleted_at is null"
    chunk: 500
  orders:
    limit: 10
  logs:
"#;

    #[test]
    fn parses_tables_in_sorted_order() {
        let config = ExportConfig::from_yaml(SAMPLE).unwrap();
        let names: Vec<&str> = config.tables.keys().map(String::as_str).collect();
        assert_eq!(names, ["logs", "orders", "users"]);
        assert_eq!(config.null_string, "\\N");

        let users = &config.tables["users"];
        assert_eq!(users.chunk, 500);
        assert_eq!(users.limit, 0);
        assert_eq!(users.predicate(), Some("deleted_at is null"));
        assert_eq!(users.transform.len(), 3);
        assert!(matches!(
            &users.transform["token"],
            TransformDecl::Alias(serde_yaml::Value::String(expr)) if expr == "md5(`token`)"
        ));
        assert!(matches!(&users.transform["nick"], TransformDecl::Typed { kind, args, .. }
            if kind == "preset" && args.len() == 2));

        let logs = &config.tables["logs"];
        assert!(logs.transform.is_empty());
        assert_eq!((logs.limit, logs.chunk), (0, 0));
        assert_eq!(logs.predicate(), None);
    }

    #[test]
    fn custom_null_string() {
        let config = ExportConfig::from_yaml("null_string: \"NULL\"\ntables: {}\n").unwrap();
        assert_eq!(config.null_string, "NULL");
        assert!(config.tables.is_empty());
    }

    #[test]
    fn limit_and_chunk_are_exclusive() {
        let config = ExportConfig::from_yaml("tables:\n  a:\n    chunk: 5\n  b:\n    limit: 3\n    chunk: 2\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::LimitAndChunk { ref table } if table == "b"));
    }

    #[test]
    fn blank_where_is_ignored() {
        let config = ExportConfig::from_yaml("tables:\n  a:\n    where: \"  \"\n").unwrap();
        assert_eq!(config.tables["a"].predicate(), None);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = ExportConfig::from_yaml("tables: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ExportConfig::load(Path::new("/nonexistent/sqlcsv.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
