// 通用工具函数

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

/// 用户主目录：优先 $HOME，其次系统默认
pub fn home_dir() -> Option<PathBuf> {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Some(PathBuf::from(home)),
        _ => dirs::home_dir(),
    }
}

/// 展开路径开头的 `~` 或 `~/`
/// `~user` 形式不处理
pub fn expand(path: &str) -> PathBuf {
    expand_with_home(path, home_dir().as_deref())
}

/// 使用指定主目录展开 `~`
pub fn expand_with_home(path: &str, home: Option<&Path>) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    if !rest.is_empty() && !rest.starts_with('/') {
        return PathBuf::from(path);
    }
    let Some(home) = home else {
        return PathBuf::from(path);
    };

    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        home.to_path_buf()
    } else {
        home.join(rest)
    }
}

/// 合并两个列表：去除首尾空白、丢弃空串、去重并保持首次出现的顺序
pub fn join_to_set(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(a.len() + b.len());
    a.iter()
        .chain(b.iter())
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_string()))
        .map(str::to_string)
        .collect()
}

/// 路径是否存在；不存在以外的错误原样返回
pub fn exists(path: &Path) -> io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// 复制本地文件，目标存在时覆盖
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    std::fs::copy(src, dst)
}
