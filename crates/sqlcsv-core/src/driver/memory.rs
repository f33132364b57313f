//! 测试用的内存会话：记录执行过的 SQL，按 `limit/offset` 切分预置的行。

use std::collections::{BTreeMap, HashSet};

use super::{Cell, DatabaseSession, DriverError, QueryError, RowCursor, RowVisitor};

#[derive(Default)]
pub struct MemorySession {
    pub tables: BTreeMap<String, MemoryTable>,
    pub executed: Vec<String>,
    /// 执行到该 offset 的分页查询时返回错误
    pub fail_at_offset: Option<u64>,
    /// 这些表的列查询会失败
    pub broken_tables: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MemorySession {
    pub fn with_table(
        mut self,
        name: &str,
        columns: &[&str],
        rows: Vec<Vec<Cell>>,
    ) -> Self {
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    /// 只返回查询语句（不含 count）
    pub fn selects(&self) -> Vec<&str> {
        self.executed
            .iter()
            .filter(|sql| !sql.starts_with("select count(*)"))
            .map(String::as_str)
            .collect()
    }

    fn table_for(
        &self,
        sql: &str,
    ) -> Option<&MemoryTable> {
        let start = sql.find("from `")? + "from `".len();
        let end = sql[start..].find('`')? + start;
        self.tables.get(&sql[start..end])
    }
}

/// 解析末尾的 `limit <n> offset <m>`
fn parse_window(sql: &str) -> Option<(usize, usize)> {
    let tail = &sql[sql.rfind(" limit ")? + " limit ".len()..];
    let mut parts = tail.split_whitespace();
    let limit = parts.next()?.parse().ok()?;
    let offset = match (parts.next(), parts.next()) {
        (Some("offset"), Some(offset)) => offset.parse().ok()?,
        _ => 0,
    };
    Some((limit, offset))
}

impl DatabaseSession for MemorySession {
    fn columns(
        &mut self,
        table: &str,
    ) -> Result<Vec<String>, DriverError> {
        if self.broken_tables.contains(table) {
            return Err(DriverError::Other(format!("查询列信息失败: {}", table)));
        }
        self.tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| DriverError::Other(format!("表 {} 不存在或没有列", table)))
    }

    fn count(
        &mut self,
        sql: &str,
    ) -> Result<u64, DriverError> {
        self.executed.push(sql.to_string());
        let table = self
            .table_for(sql)
            .ok_or_else(|| DriverError::Other(format!("未知的表: {}", sql)))?;
        Ok(table.rows.len() as u64)
    }

    fn query(
        &mut self,
        sql: &str,
        visit: &mut RowVisitor<'_>,
    ) -> Result<u64, QueryError> {
        self.executed.push(sql.to_string());

        let window = parse_window(sql);
        if let (Some(fail), Some((_, offset))) = (self.fail_at_offset, window) {
            if fail == offset as u64 {
                return Err(QueryError::Execute {
                    sql: sql.to_string(),
                    source: DriverError::Other("connection lost".into()),
                });
            }
        }

        let table = self.table_for(sql).cloned().ok_or_else(|| QueryError::Execute {
            sql: sql.to_string(),
            source: DriverError::Other("未知的表".into()),
        })?;
        let rows = match window {
            Some((limit, offset)) => table.rows.into_iter().skip(offset).take(limit).collect(),
            None => table.rows,
        };

        let mut cursor = VecCursor::new(table.columns, rows);
        Ok(visit(&mut cursor)?)
    }
}

/// 基于 `Vec` 的游标，可在指定行号注入游标错误
pub struct VecCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Cell>>,
    fail_after: Option<usize>,
    served: usize,
}

impl VecCursor {
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            fail_after: None,
            served: 0,
        }
    }

    pub fn failing_after(
        mut self,
        rows: usize,
    ) -> Self {
        self.fail_after = Some(rows);
        self
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.columns.clone())
    }

    fn next_row(&mut self) -> Result<Option<Vec<Cell>>, DriverError> {
        if self.fail_after == Some(self.served) {
            return Err(DriverError::Cursor("connection reset".into()));
        }
        self.served += 1;
        Ok(self.rows.next())
    }
}
