use std::borrow::Cow;
use std::io::{self, Write};

use thiserror::Error;

use crate::DEFAULT_NULL_STRING;
use crate::driver::{Cell, DriverError, RowCursor};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("读取列名失败: {0}")]
    Columns(#[source] DriverError),

    #[error("读取行失败: {0}")]
    Scan(#[source] DriverError),

    #[error("写入 CSV 记录失败: {0}")]
    Write(#[source] csv::Error),

    #[error("遍历结果集失败: {0}")]
    Cursor(#[source] DriverError),

    #[error("刷新输出失败: {0}")]
    Flush(#[source] io::Error),
}

/// 把结果集写成某种输出格式
pub trait RowConverter {
    /// 消费游标中的所有行，返回写入的行数
    fn process(
        &self,
        cursor: &mut dyn RowCursor,
        out: &mut dyn Write,
    ) -> Result<u64, ConvertError>;
}

/// 无表头 CSV，NULL 写为占位符，文本中的反斜杠加倍
#[derive(Debug, Clone)]
pub struct CsvConverter {
    pub null_string: String,
}

impl Default for CsvConverter {
    fn default() -> Self {
        Self {
            null_string: DEFAULT_NULL_STRING.to_string(),
        }
    }
}

impl CsvConverter {
    pub fn new(null_string: impl Into<String>) -> Self {
        Self {
            null_string: null_string.into(),
        }
    }

    fn field<'a>(
        &'a self,
        cell: &'a Cell,
    ) -> Cow<'a, [u8]> {
        match cell {
            Cell::Null => Cow::Borrowed(self.null_string.as_bytes()),
            Cell::Bytes(bytes) => escape_backslashes(bytes),
            other => Cow::Owned(natural_text(other).into_bytes()),
        }
    }
}

impl RowConverter for CsvConverter {
    fn process(
        &self,
        cursor: &mut dyn RowCursor,
        out: &mut dyn Write,
    ) -> Result<u64, ConvertError> {
        let columns = cursor.columns().map_err(ConvertError::Columns)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);

        let mut rows = 0u64;
        loop {
            let cells = match cursor.next_row() {
                Ok(Some(cells)) => cells,
                Ok(None) => break,
                Err(err @ DriverError::Scan(_)) => return Err(ConvertError::Scan(err)),
                Err(err) => return Err(ConvertError::Cursor(err)),
            };
            if cells.len() != columns.len() {
                return Err(ConvertError::Scan(DriverError::Scan(format!(
                    "期望 {} 列，实际 {} 列",
                    columns.len(),
                    cells.len()
                ))));
            }

            let record = cells.iter().map(|cell| self.field(cell)).collect::<Vec<_>>();
            writer.write_record(&record).map_err(ConvertError::Write)?;
            rows += 1;
        }

        writer.flush().map_err(ConvertError::Flush)?;
        tracing::trace!(rows, "CSV 转换完成");
        Ok(rows)
    }
}

/// `\` -> `\\`，按字节处理，非 UTF-8 的二进制列原样保留
fn escape_backslashes(bytes: &[u8]) -> Cow<'_, [u8]> {
    if !bytes.contains(&b'\\') {
        return Cow::Borrowed(bytes);
    }
    let mut escaped = Vec::with_capacity(bytes.len() + 8);
    for &b in bytes {
        if b == b'\\' {
            escaped.push(b'\\');
        }
        escaped.push(b);
    }
    Cow::Owned(escaped)
}

fn natural_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Cell::Int(int) => int.to_string(),
        Cell::UInt(uint) => uint.to_string(),
        Cell::Float(float) => float.to_string(),
        Cell::Double(double) => double.to_string(),
        Cell::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
            if *micros != 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
        Cell::Time(neg, days, hours, minutes, seconds, micros) => {
            let sign = if *neg { "-" } else { "" };
            let mut text = if *days != 0 {
                format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            };
            if *micros != 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            text
        }
    }
}
