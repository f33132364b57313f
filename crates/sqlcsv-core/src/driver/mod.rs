use crate::{DataSourceOptions, convert::ConvertError};

pub use self::mysql::MySQLDriver;
pub use self::sqlite::SQLiteDriver;

#[cfg(test)]
pub(crate) mod memory;
mod mysql;
mod sqlite;

/// 驱动原生的单元格值
///
/// 文本与二进制列统一以 `Bytes` 返回，由转换器负责解码与转义。
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Null,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// year, month, day, hour, minute, second, micros
    Date(u16, u8, u8, u8, u8, u8, u32),
    /// negative, days, hours, minutes, seconds, micros
    Time(bool, u32, u8, u8, u8, u32),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Bytes(value.as_bytes().to_vec())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{0}")]
    Other(String),
    #[error("配置字段缺失: {0}")]
    MissingField(String),
    #[error("配置字段非法: {0}")]
    InvalidField(String),
    #[error("读取列值失败: {0}")]
    Scan(String),
    #[error("游标前进失败: {0}")]
    Cursor(String),
}

/// 查询执行失败，或结果集在遍历过程中失败
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("执行查询 \"{sql}\" 失败: {source}")]
    Execute {
        sql: String,
        #[source]
        source: DriverError,
    },
    #[error("处理结果失败: {0}")]
    Convert(#[from] ConvertError),
}

/// 只进游标，一次只持有一行
pub trait RowCursor {
    fn columns(&self) -> Result<Vec<String>, DriverError>;

    /// 返回下一行；`Ok(None)` 表示结果集结束
    fn next_row(&mut self) -> Result<Option<Vec<Cell>>, DriverError>;
}

/// 结果集访问者，游标只在回调期间有效
pub type RowVisitor<'v> = dyn FnMut(&mut dyn RowCursor) -> Result<u64, ConvertError> + 'v;

pub trait DatabaseDriver {
    type Config;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError>;

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

pub trait DatabaseSession: Send {
    /// 按表结构顺序返回列名
    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<String>, DriverError>;

    /// 执行返回单个整数的查询（如 `select count(*)`）
    fn count(
        &mut self,
        sql: &str,
    ) -> Result<u64, DriverError>;

    /// 执行查询并把游标交给 `visit`，返回 `visit` 处理的行数
    fn query(
        &mut self,
        sql: &str,
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64, QueryError>;
}

pub fn check_connection(opts: &DataSourceOptions) -> Result<(), DriverError> {
    match opts {
        DataSourceOptions::MySQL(config) => MySQLDriver.check_connection(config),
        DataSourceOptions::SQLite(config) => SQLiteDriver.check_connection(config),
    }
}

pub fn create_connection(opts: &DataSourceOptions) -> Result<Box<dyn DatabaseSession>, DriverError> {
    match opts {
        DataSourceOptions::MySQL(config) => MySQLDriver.create_connection(config),
        DataSourceOptions::SQLite(config) => SQLiteDriver.create_connection(config),
    }
}

pub fn validate_sql(sql: &str) -> Result<(), DriverError> {
    if sql.trim().is_empty() {
        return Err(DriverError::InvalidField("sql".into()));
    }
    Ok(())
}

pub fn escape_quote(s: &str) -> String {
    s.replace('"', "\"\"")
}

pub fn escape_backtick(s: &str) -> String {
    s.replace('`', "``")
}
