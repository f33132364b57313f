use std::path::Path;

use rusqlite::{Connection, OpenFlags, Rows, types::ValueRef};

use crate::SQLiteOptions;

use super::{
    Cell, DatabaseDriver, DatabaseSession, DriverError, QueryError, RowCursor, RowVisitor, escape_quote, validate_sql,
};

#[derive(Debug, Clone, Copy)]
pub struct SQLiteDriver;

struct SQLiteConnection {
    conn: Connection,
}

impl SQLiteConnection {
    fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for SQLiteConnection {
    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<String>, DriverError> {
        let sql = format!("PRAGMA table_info(\"{}\")", escape_quote(table));
        tracing::debug!(sql = %sql);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|err| DriverError::Other(format!("查询列信息失败: {}", err)))?;

        let mut columns = vec![];
        for row in rows {
            columns.push(row.map_err(|err| DriverError::Other(format!("读取列信息失败: {}", err)))?);
        }

        // PRAGMA 对不存在的表返回空结果而不是报错
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
        let total = self
            .conn
            .query_row(sql, [], |row| row.get::<_, i64>(0))
            .map_err(|err| DriverError::Other(format!("统计行数失败: {}", err)))?;
        Ok(total.max(0) as u64)
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

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| execute_err(DriverError::Other(format!("准备查询失败: {}", err))))?;
        let columns = stmt.column_names().iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let rows = stmt
            .query([])
            .map_err(|err| execute_err(DriverError::Other(format!("执行查询失败: {}", err))))?;

        let mut cursor = SQLiteCursor { columns, rows };
        Ok(visit(&mut cursor)?)
    }
}

struct SQLiteCursor<'stmt> {
    columns: Vec<String>,
    rows: Rows<'stmt>,
}

impl RowCursor for SQLiteCursor<'_> {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.columns.clone())
    }

    fn next_row(&mut self) -> Result<Option<Vec<Cell>>, DriverError> {
        let row = match self
            .rows
            .next()
            .map_err(|err| DriverError::Cursor(err.to_string()))?
        {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut cells = Vec::with_capacity(self.columns.len());
        for (idx, name) in self.columns.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .map_err(|err| DriverError::Scan(format!("列 {name}: {}", err)))?;
            cells.push(Cell::from(value));
        }
        Ok(Some(cells))
    }
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(int) => Cell::Int(int),
            ValueRef::Real(real) => Cell::Double(real),
            ValueRef::Text(text) => Cell::Bytes(text.to_vec()),
            ValueRef::Blob(blob) => Cell::Bytes(blob.to_vec()),
        }
    }
}

impl DatabaseDriver for SQLiteDriver {
    type Config = SQLiteOptions;

    fn check_connection(
        &self,
        config: &Self::Config,
    ) -> Result<(), DriverError> {
        let conn = open_conn(config)?;
        conn.query_row("SELECT 1", [], |_| Ok::<_, rusqlite::Error>(()))
            .map_err(|err| DriverError::Other(format!("校验查询失败: {}", err)))?;
        Ok(())
    }

    fn create_connection(
        &self,
        config: &Self::Config,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(config)?;
        Ok(Box::new(SQLiteConnection::new(conn)))
    }
}

fn open_conn(config: &SQLiteOptions) -> Result<Connection, DriverError> {
    let path_str = config.filepath.trim();
    if path_str.is_empty() {
        return Err(DriverError::MissingField("file_path".into()));
    }

    // 导出只读数据，不允许隐式创建空库
    let path = Path::new(path_str);
    if !path.exists() {
        return Err(DriverError::InvalidField("file_path 不存在".into()));
    }

    let flags = if config.readonly {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };

    Connection::open_with_flags(path, flags).map_err(|err| DriverError::Other(format!("打开 SQLite 失败: {}", err)))
}
