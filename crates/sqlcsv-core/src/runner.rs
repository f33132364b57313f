use std::path::Path;

use thiserror::Error;

use crate::config::{ConfigError, ExportConfig};
use crate::convert::CsvConverter;
use crate::driver::{DatabaseSession, DriverError};
use crate::export::{ExportError, ExportSummary, PageProgress, TableExport, export_table};
use crate::query::build_query;
use crate::transform::BuildError;

/// 终止整个运行的错误
#[derive(Error, Debug)]
pub enum RunError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("导出表 {table} 失败: {source}")]
    Export {
        table: String,
        #[source]
        source: ExportError,
    },
}

/// 只影响单表的错误：记录警告并跳过该表
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("获取列名失败: {0}")]
    ColumnFetch(#[source] DriverError),

    #[error("构建查询失败: {0}")]
    QueryBuild(#[source] BuildError),
}

#[derive(Debug)]
pub struct SkippedTable {
    pub table: String,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub enum RunEvent<'a> {
    TableStarted { table: &'a str, query: &'a str },
    Page(&'a PageProgress),
    TableSkipped(&'a SkippedTable),
    TableCompleted(&'a ExportSummary),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub exported: Vec<ExportSummary>,
    pub skipped: Vec<SkippedTable>,
}

impl RunReport {
    pub fn total_rows(&self) -> u64 {
        self.exported.iter().map(|s| s.rows).sum()
    }
}

/// 按表名顺序逐表导出
///
/// 列名获取或查询构建失败只跳过当前表；导出失败终止整个运行。
pub fn run(
    session: &mut dyn DatabaseSession,
    config: &ExportConfig,
    dest: &Path,
    observer: &mut dyn FnMut(RunEvent<'_>),
) -> Result<RunReport, RunError> {
    config.validate()?;

    let converter = CsvConverter::new(config.null_string.clone());
    let mut report = RunReport::default();

    for (table, opts) in &config.tables {
        let prepared = session
            .columns(table)
            .map_err(SkipReason::ColumnFetch)
            .and_then(|columns| build_query(table, &columns, opts).map_err(SkipReason::QueryBuild));

        let query = match prepared {
            Ok(query) => query,
            Err(reason) => {
                tracing::warn!("跳过表 {}: {}", table, reason);
                let skipped = SkippedTable {
                    table: table.clone(),
                    reason,
                };
                observer(RunEvent::TableSkipped(&skipped));
                report.skipped.push(skipped);
                continue;
            }
        };

        tracing::info!("正在导出 {} ...", table);
        tracing::debug!(table = %table, sql = %query);
        observer(RunEvent::TableStarted { table, query: &query });

        let req = TableExport {
            table,
            query: &query,
            chunk: opts.chunk,
            dest,
        };
        let summary = export_table(session, &converter, &req, &mut |page: &PageProgress| {
            observer(RunEvent::Page(page))
        })
        .map_err(|source| {
            tracing::error!("导出表 {} 失败: {}", table, source);
            RunError::Export {
                table: table.clone(),
                source,
            }
        })?;

        observer(RunEvent::TableCompleted(&summary));
        report.exported.push(summary);
    }

    tracing::info!(
        "全部完成：导出 {} 张表，共 {} 行，跳过 {} 张表",
        report.exported.len(),
        report.total_rows(),
        report.skipped.len()
    );
    Ok(report)
}
