use std::path::Path;
use std::time::Instant;

use serde_json::json;

use sqlcsv_core::{DatabaseSession, ExportConfig, PageProgress, RunError, RunEvent};

use crate::{MessageKind, ProgressMessage, print_completed, print_progress, print_status};

/// 执行导出，并把每个事件写成一行 JSON 进度消息
pub fn run(
    session: &mut dyn DatabaseSession,
    config: &ExportConfig,
    dest: &Path,
) -> Result<(), RunError> {
    let start_time = Instant::now();

    let report = sqlcsv_core::run(session, config, dest, &mut |event: RunEvent<'_>| match event {
        RunEvent::TableStarted { table, query } => {
            print_status(json!({
                "table": table,
                "status": "exporting",
                "query": query,
            }));
        }
        RunEvent::Page(progress) => print_progress(page_message(progress)),
        RunEvent::TableSkipped(skipped) => {
            print_status(json!({
                "table": skipped.table,
                "status": "skipped",
                "reason": skipped.reason.to_string(),
            }));
        }
        RunEvent::TableCompleted(summary) => {
            print_status(json!({
                "table": summary.table,
                "status": "completed",
                "file": summary.path.display().to_string(),
                "rows": summary.rows,
                "pages": summary.pages,
                "elapsed": summary.elapsed.as_secs_f64(),
            }));
        }
    })?;

    let elapsed = start_time.elapsed();
    print_completed(json!({
        "status": "success",
        "tables": report.exported.len(),
        "skipped": report.skipped.iter().map(|s| s.table.as_str()).collect::<Vec<_>>(),
        "rows": report.total_rows(),
        "dest": dest.display().to_string(),
        "elapsed": elapsed.as_secs_f64(),
    }));

    Ok(())
}

fn page_message(progress: &PageProgress) -> ProgressMessage {
    // 未分页导出时不统计总行数，只能按页数估算
    let percent = match progress.total_rows {
        Some(0) | None => (progress.page + 1) as f64 / progress.pages as f64 * 100.0,
        Some(total) => (progress.exported_rows as f64 / total as f64 * 100.0).min(100.0),
    };

    ProgressMessage::new(
        MessageKind::Progress,
        json!({
            "table": progress.table,
            "page": progress.page + 1,
            "pages": progress.pages,
            "offset": progress.offset,
            "rows": progress.rows,
            "exported_rows": progress.exported_rows,
            "total_rows": progress.total_rows,
            "percentage": percent,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(
        page: u64,
        pages: u64,
        exported_rows: u64,
        total_rows: Option<u64>,
    ) -> PageProgress {
        PageProgress {
            table: "users".into(),
            page,
            pages,
            offset: page * 50,
            rows: 50,
            exported_rows,
            total_rows,
        }
    }

    fn data(msg: &ProgressMessage) -> serde_json::Value {
        serde_json::to_value(msg).unwrap()["data"].clone()
    }

    #[test]
    fn percentage_follows_exported_rows() {
        let value = data(&page_message(&progress(0, 3, 50, Some(100))));
        assert_eq!(value["percentage"], 50.0);
        assert_eq!(value["page"], 1);
        assert_eq!(value["total_rows"], 100);
    }

    #[test]
    fn percentage_without_count_uses_pages() {
        let value = data(&page_message(&progress(0, 1, 7, None)));
        assert_eq!(value["percentage"], 100.0);
        assert!(value["total_rows"].is_null());
    }

    #[test]
    fn empty_table_reports_page_progress() {
        let value = data(&page_message(&progress(0, 1, 0, Some(0))));
        assert_eq!(value["percentage"], 100.0);
    }
}
