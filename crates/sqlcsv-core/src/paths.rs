use std::{fs::create_dir_all, path::PathBuf};

/// 获取 sqlcsv 根目录（~/.sqlcsv）
///
/// Fallback: 如果 home_dir 失败，使用 ./.sqlcsv
pub fn root_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".sqlcsv"))
        .unwrap_or_else(|| PathBuf::from(".sqlcsv"))
}

/// 获取日志目录（~/.sqlcsv/logs）
pub fn logs_dir() -> PathBuf {
    let dir = root_dir().join("logs");
    let _ = create_dir_all(&dir);
    dir
}
