use crate::config::TableOptions;
use crate::transform::{BuildError, quote_ident, resolve};

/// 构建单表的基础查询
///
/// 投影顺序与表结构的列顺序一致；`chunk` 不参与构建，分页由导出器追加。
pub fn build_query(
    table: &str,
    columns: &[String],
    opts: &TableOptions,
) -> Result<String, BuildError> {
    let fields = columns
        .iter()
        .map(|col| resolve(col, opts.transform.get(col)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = format!("select {} from {}", fields.join(", "), quote_ident(table));
    if let Some(predicate) = opts.predicate() {
        sql.push_str(&format!(" where {}", predicate));
    }
    if opts.limit != 0 {
        sql.push_str(&format!(" limit {}", opts.limit));
    }
    Ok(sql)
}

/// 分页查询：`<query> limit <chunk> offset <chunk*page>`
pub fn page_query(
    query: &str,
    chunk: u64,
    page: u64,
) -> String {
    format!("{} limit {} offset {}", query, chunk, chunk * page)
}

/// 统计总行数（不带 where 条件）
pub fn count_query(table: &str) -> String {
    format!("select count(*) from {}", quote_ident(table))
}
