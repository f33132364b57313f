use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::convert::RowConverter;
use crate::driver::{DatabaseSession, DriverError, QueryError, RowCursor};
use crate::query::{count_query, page_query};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("创建目录 {} 失败: {source}", .path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("创建文件 {} 失败: {source}", .path.display())]
    FileCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("统计表 {table} 总行数失败: {source}")]
    Count {
        table: String,
        #[source]
        source: DriverError,
    },

    #[error("导出第 {page} 页（offset={offset}）失败: {source}")]
    Page {
        page: u64,
        offset: u64,
        #[source]
        source: QueryError,
    },

    #[error("刷新文件缓冲失败: {0}")]
    Flush(#[source] io::Error),
}

/// 单表导出请求
#[derive(Debug, Clone)]
pub struct TableExport<'a> {
    pub table: &'a str,
    /// 基础查询（不含分页）
    pub query: &'a str,
    /// 每页行数，0 表示一次查询导出
    pub chunk: u64,
    pub dest: &'a Path,
}

impl TableExport<'_> {
    /// `<dest>/<table>.csv`
    pub fn output_path(&self) -> PathBuf {
        self.dest.join(format!("{}.csv", self.table))
    }
}

/// 每页查询完成后的进度
#[derive(Debug, Clone, PartialEq)]
pub struct PageProgress {
    pub table: String,
    pub page: u64,
    pub pages: u64,
    pub offset: u64,
    pub rows: u64,
    pub exported_rows: u64,
    pub total_rows: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub table: String,
    pub path: PathBuf,
    pub rows: u64,
    pub pages: u64,
    pub elapsed: Duration,
}

/// 导出单表到 `<dest>/<table>.csv`
///
/// 所有分页写入同一个文件句柄；任一页失败立即中止，已写入的文件保留。
pub fn export_table(
    session: &mut dyn DatabaseSession,
    converter: &dyn RowConverter,
    req: &TableExport<'_>,
    on_page: &mut dyn FnMut(&PageProgress),
) -> Result<ExportSummary, ExportError> {
    let start_time = Instant::now();

    // 1. 确保目标目录存在
    if !req.dest.exists() {
        fs::create_dir_all(req.dest).map_err(|source| ExportError::DirectoryCreate {
            path: req.dest.to_path_buf(),
            source,
        })?;
    }

    // 2. 创建（截断）输出文件
    let path = req.output_path();
    let file = File::create(&path).map_err(|source| ExportError::FileCreate {
        path: path.clone(),
        source,
    })?;
    tracing::debug!("输出文件: {}", path.display());
    let mut writer = BufWriter::new(file);

    // 3. 计算分页
    let (total_rows, pages) = if req.chunk == 0 {
        (None, 1)
    } else {
        let cnt = session
            .count(&count_query(req.table))
            .map_err(|source| ExportError::Count {
                table: req.table.to_string(),
                source,
            })?;
        // 行数恰为 chunk 的整数倍时会多查一页空数据
        (Some(cnt), cnt / req.chunk + 1)
    };
    tracing::info!(table = req.table, chunk = req.chunk, pages, total_rows = ?total_rows, "开始导出");

    // 4. 逐页查询并追加到同一文件
    let mut exported_rows = 0u64;
    for page in 0..pages {
        let (sql, offset) = if req.chunk == 0 {
            (req.query.to_string(), 0)
        } else {
            (page_query(req.query, req.chunk, page), req.chunk * page)
        };

        tracing::debug!("查询第 {} 页数据，offset={}", page, offset);
        let rows = session
            .query(&sql, &mut |cursor: &mut dyn RowCursor| converter.process(cursor, &mut writer))
            .map_err(|source| ExportError::Page { page, offset, source })?;
        exported_rows += rows;

        on_page(&PageProgress {
            table: req.table.to_string(),
            page,
            pages,
            offset,
            rows,
            exported_rows,
            total_rows,
        });
    }

    writer.flush().map_err(ExportError::Flush)?;

    let elapsed = start_time.elapsed();
    tracing::info!(
        "表 {} 导出完成，共 {} 行，{} 页，耗时 {:.1} 秒",
        req.table,
        exported_rows,
        pages,
        elapsed.as_secs_f64()
    );

    Ok(ExportSummary {
        table: req.table.to_string(),
        path,
        rows: exported_rows,
        pages,
        elapsed,
    })
}
