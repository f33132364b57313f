use mysql::{Conn, Opts, OptsBuilder, QueryResult, Row, SslOpts, Text, Value, prelude::Queryable};

use crate::MySQLOptions;

use super::{
    Cell, DatabaseDriver, DatabaseSession, DriverError, QueryError, RowCursor, RowVisitor, escape_backtick,
    validate_sql,
};

#[derive(Debug, Clone, Copy)]
pub struct MySQLDriver;

impl DatabaseDriver for MySQLDriver {
    type Config = MySQLOptions;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError> {
        let mut conn = open_conn(config)?;
        conn.ping()
            .map_err(|err| DriverError::Other(format!("ping 失败: {}", err)))?;
        Ok(())
    }

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(MySQLSession::new(conn)))
    }
}

struct MySQLSession {
    conn: Conn,
}

impl MySQLSession {
    fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for MySQLSession {
    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<String>, DriverError> {
        let sql = format!("SHOW COLUMNS FROM `{}`", escape_backtick(table));
        tracing::debug!(sql = %sql);
        let rows: Vec<Row> = self
            .conn
            .query(&sql)
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row
                .get("Field")
                .ok_or_else(|| DriverError::Other("缺少 Field 字段".into()))?;
            columns.push(name);
        }

        if columns.is_empty() {
            return Err(DriverError::Other(format!("表 {} 不存在或没有列", table)));
        }
        Ok(columns)
    }

    fn count(
        &mut self,
        sql: &str,
    ) -> Result<u64, DriverError> {
        validate_sql(sql)?;
        tracing::debug!(sql = %sql);
        let total: Option<u64> = self
            .conn
            .query_first(sql)
            .map_err(|err| DriverError::Other(format!("统计行数失败: {}", err)))?;
        Ok(total.unwrap_or(0))
    }

    fn query(
        &mut self,
        sql: &str,
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64, QueryError> {
        let execute_err = |source: DriverError| QueryError::Execute {
            sql: sql.to_string(),
            source,
        };

        validate_sql(sql).map_err(execute_err)?;
        tracing::debug!(sql = %sql);

        let result = self
            .conn
            .query_iter(sql)
            .map_err(|err| execute_err(DriverError::Other(err.to_string())))?;

        let mut cursor = MySQLCursor { result };
        Ok(visit(&mut cursor)?)
    }
}

/// 文本协议结果集，未读完的行在 drop 时由驱动丢弃
struct MySQLCursor<'c, 't, 'tc> {
    result: QueryResult<'c, 't, 'tc, Text>,
}

impl RowCursor for MySQLCursor<'_, '_, '_> {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        Ok(self
            .result
            .columns()
            .as_ref()
            .iter()
            .map(|col| col.name_str().into_owned())
            .collect())
    }

    fn next_row(&mut self) -> Result<Option<Vec<Cell>>, DriverError> {
        let mut row = match self.result.next() {
            None => return Ok(None),
            Some(row) => row.map_err(|err| DriverError::Cursor(err.to_string()))?,
        };

        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            let value = row
                .take::<Value, _>(idx)
                .ok_or_else(|| DriverError::Scan(format!("第 {} 列缺失", idx)))?;
            cells.push(Cell::from(value));
        }
        Ok(Some(cells))
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::NULL => Cell::Null,
            Value::Bytes(bytes) => Cell::Bytes(bytes),
            Value::Int(int) => Cell::Int(int),
            Value::UInt(uint) => Cell::UInt(uint),
            Value::Float(float) => Cell::Float(float),
            Value::Double(double) => Cell::Double(double),
            Value::Date(year, month, day, hour, minute, second, micros) => {
                Cell::Date(year, month, day, hour, minute, second, micros)
            }
            Value::Time(neg, days, hours, minutes, seconds, micros) => {
                Cell::Time(neg, days, hours, minutes, seconds, micros)
            }
        }
    }
}

fn open_conn(config: &MySQLOptions) -> Result<Conn, DriverError> {
    if config.host.trim().is_empty() {
        return Err(DriverError::MissingField("host".into()));
    }
    if config.username.trim().is_empty() {
        return Err(DriverError::MissingField("username".into()));
    }
    if config.database.trim().is_empty() {
        return Err(DriverError::MissingField("database".into()));
    }
    let port = config
        .port
        .trim()
        .parse::<u16>()
        .map_err(|_| DriverError::InvalidField(format!("port: {}", config.port)))?;

    let mut builder = OptsBuilder::new();
    builder = builder.ip_or_hostname(Some(config.host.clone()));
    builder = builder.tcp_port(port);
    builder = builder.user(Some(config.username.clone()));
    builder = builder.pass(Some(config.password.clone()));
    builder = builder.db_name(Some(config.database.clone()));

    if config.use_tls {
        builder = builder.ssl_opts(Some(SslOpts::default()));
    }
    let opts = Opts::from(builder);
    Conn::new(opts).map_err(|err| DriverError::Other(format!("连接失败: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_conn_requires_host_user_and_database() {
        let mut opts = MySQLOptions {
            database: "shop".into(),
            ..MySQLOptions::default()
        };
        opts.host = " ".into();
        assert!(matches!(open_conn(&opts), Err(DriverError::MissingField(field)) if field == "host"));

        opts.host = "127.0.0.1".into();
        opts.database = String::new();
        assert!(matches!(open_conn(&opts), Err(DriverError::MissingField(field)) if field == "database"));
    }

    #[test]
    fn open_conn_rejects_non_numeric_port() {
        let opts = MySQLOptions {
            port: "mysql".into(),
            database: "shop".into(),
            ..MySQLOptions::default()
        };
        assert!(matches!(open_conn(&opts), Err(DriverError::InvalidField(_))));
    }

    #[test]
    fn native_values_map_to_cells() {
        assert_eq!(Cell::from(Value::NULL), Cell::Null);
        assert_eq!(Cell::from(Value::Bytes(b"a\\b".to_vec())), Cell::Bytes(b"a\\b".to_vec()));
        assert_eq!(Cell::from(Value::Int(-3)), Cell::Int(-3));
        assert_eq!(
            Cell::from(Value::Date(2024, 2, 29, 13, 5, 0, 0)),
            Cell::Date(2024, 2, 29, 13, 5, 0, 0)
        );
    }
}
