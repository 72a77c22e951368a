// SFTP 文件操作
// 在单个 SFTP 子会话上完成读取、列目录、下载与递归删除

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::path;
use super::remote::FileInfo;
use crate::progress::{ProgressTicker, SharedProgress, TransferCounter};

/// 复制缓冲区大小
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// 遍历得到的远程条目
#[derive(Debug)]
struct WalkEntry {
    /// 远程完整路径
    path: String,
    /// 相对遍历根的路径
    relative: String,
    is_directory: bool,
    size: u64,
}

fn remote_fs(host: &str, operation: &'static str, path: &str, cause: impl ToString) -> SessionError {
    SessionError::RemoteFs {
        host: host.to_string(),
        operation,
        path: path.to_string(),
        cause: cause.to_string(),
    }
}

fn transfer_error(host: &str, path: &str, cause: impl ToString) -> SessionError {
    SessionError::Transfer {
        host: host.to_string(),
        path: path.to_string(),
        cause: cause.to_string(),
    }
}

/// 读取远程文件全部内容
pub async fn get_content(sftp: &SftpSession, host: &str, path: &str) -> Result<Vec<u8>, SessionError> {
    debug!("[SFTP] Reading file: {}", path);

    let mut file = sftp
        .open(path)
        .await
        .map_err(|e| remote_fs(host, "open", path, e))?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .await
        .map_err(|e| transfer_error(host, path, e))?;

    debug!("[SFTP] Read {} bytes from {}", content.len(), path);
    Ok(content)
}

/// 列出目录（单层，跳过 . 与 ..）
pub async fn list_directory(
    sftp: &SftpSession,
    host: &str,
    dir: &str,
) -> Result<Vec<FileInfo>, SessionError> {
    debug!("[SFTP] Reading directory: {}", dir);

    let entries = sftp
        .read_dir(dir)
        .await
        .map_err(|e| remote_fs(host, "list directory", dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        files.push(FileInfo::new(path::join(dir, &name), entry.metadata().is_dir()));
    }

    debug!("[SFTP] Read {} entries from {}", files.len(), dir);
    Ok(files)
}

/// 下载单个文件
/// `dest` 为已存在目录时写入 `dest/basename(src)`，否则 `dest` 即目标文件
pub async fn receive_file(
    sftp: &SftpSession,
    host: &str,
    src: &str,
    dest: &Path,
    progress: Option<SharedProgress>,
) -> Result<(), SessionError> {
    let target = resolve_target(dest, src).await;

    let total = sftp
        .metadata(src)
        .await
        .map_err(|e| remote_fs(host, "stat", src, e))?
        .size
        .unwrap_or(0);

    info!("[SFTP] Copying '{}' to '{}' ({} bytes)", src, target.display(), total);

    let counter = Arc::new(TransferCounter::new());
    let ticker = progress.map(|p| ProgressTicker::spawn(counter.clone(), total, p));

    let result = copy_file(sftp, host, src, &target, &counter).await;

    if let Some(ticker) = ticker {
        ticker.finish().await;
    }
    result
}

/// 递归下载目录
/// `src` 为普通文件时等同于 [`receive_file`]
pub async fn receive_directory(
    sftp: &SftpSession,
    host: &str,
    src: &str,
    dest: &Path,
    progress: Option<SharedProgress>,
) -> Result<(), SessionError> {
    prepare_destination(dest).await?;

    let attrs = sftp
        .metadata(src)
        .await
        .map_err(|e| remote_fs(host, "stat", src, e))?;
    if !attrs.is_dir() {
        return receive_file(sftp, host, src, dest, progress).await;
    }

    let mut entries = Vec::new();
    walk(sftp, host, src.to_string(), src, &mut entries).await?;
    let plan = DownloadPlan::new(&entries, dest);

    info!(
        "[SFTP] Copying directory '{}' to '{}' ({} entries, {} bytes)",
        src,
        dest.display(),
        entries.len(),
        plan.total
    );

    // 先建立本地目录骨架
    for dir in &plan.dirs {
        create_skeleton_dir(dir).await?;
    }

    let counter = Arc::new(TransferCounter::new());
    let ticker = progress.map(|p| ProgressTicker::spawn(counter.clone(), plan.total, p));

    let mut result = Ok(());
    for (remote, local) in &plan.files {
        if let Err(e) = copy_file(sftp, host, remote, local, &counter).await {
            result = Err(e);
            break;
        }
    }

    if let Some(ticker) = ticker {
        ticker.finish().await;
    }
    result
}

/// 递归删除远程文件或目录
pub async fn remove(sftp: &SftpSession, host: &str, target: &str) -> Result<(), SessionError> {
    info!("[SFTP] Removing '{}'", target);
    remove_recursive(sftp, host, target.to_string()).await
}

fn remove_recursive<'a>(
    sftp: &'a SftpSession,
    host: &'a str,
    target: String,
) -> BoxFuture<'a, Result<(), SessionError>> {
    async move {
        let attrs = sftp
            .symlink_metadata(&target)
            .await
            .map_err(|e| remote_fs(host, "stat", &target, e))?;

        if !attrs.is_dir() {
            return sftp
                .remove_file(&target)
                .await
                .map_err(|e| remote_fs(host, "remove file", &target, e));
        }

        let children = sftp
            .read_dir(&target)
            .await
            .map_err(|e| remote_fs(host, "list directory", &target, e))?;
        for child in children {
            let name = child.file_name();
            if name == "." || name == ".." {
                continue;
            }
            remove_recursive(sftp, host, path::join(&target, &name)).await?;
        }

        sftp.remove_dir(&target)
            .await
            .map_err(|e| remote_fs(host, "remove directory", &target, e))
    }
    .boxed()
}

/// 按名称排序的先序遍历
/// 遍历根无法读取时返回错误；更深层无法读取的目录记录警告后跳过
fn walk<'a>(
    sftp: &'a SftpSession,
    host: &'a str,
    dir: String,
    root: &'a str,
    out: &'a mut Vec<WalkEntry>,
) -> BoxFuture<'a, Result<(), SessionError>> {
    async move {
        let listing = match sftp.read_dir(&dir).await {
            Ok(listing) => listing,
            Err(e) => return unreadable_dir(host, &dir, root, e),
        };

        let children = listing
            .map(|entry| {
                let attrs = entry.metadata();
                (entry.file_name(), attrs.is_dir(), attrs.size.unwrap_or(0))
            })
            .collect();

        for entry in sorted_children(&dir, root, children) {
            let subdir = entry.is_directory.then(|| entry.path.clone());
            out.push(entry);
            if let Some(subdir) = subdir {
                walk(sftp, host, subdir, root, out).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

fn unreadable_dir(host: &str, dir: &str, root: &str, cause: impl ToString) -> Result<(), SessionError> {
    if path::clean(dir) == path::clean(root) {
        return Err(remote_fs(host, "list directory", dir, cause));
    }
    warn!("[SFTP] Skipping '{}' on '{}' ({})", dir, host, cause.to_string());
    Ok(())
}

/// 一层目录的条目：跳过 . 与 ..，按名称排序，计算相对遍历根的路径
fn sorted_children(dir: &str, root: &str, children: Vec<(String, bool, u64)>) -> Vec<WalkEntry> {
    let mut children: Vec<_> = children
        .into_iter()
        .filter(|(name, ..)| name != "." && name != "..")
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));

    children
        .into_iter()
        .map(|(name, is_directory, size)| {
            let full = path::join(dir, &name);
            let relative = path::relative(root, &full).unwrap_or(name.as_str()).to_string();
            WalkEntry {
                path: full,
                relative,
                is_directory,
                size,
            }
        })
        .collect()
}

/// 目录下载计划：先建的本地目录、要复制的文件与总字节数
#[derive(Debug, Default, PartialEq, Eq)]
struct DownloadPlan {
    dirs: Vec<PathBuf>,
    /// (远程路径, 本地路径)
    files: Vec<(String, PathBuf)>,
    total: u64,
}

impl DownloadPlan {
    fn new(entries: &[WalkEntry], dest: &Path) -> Self {
        let mut plan = DownloadPlan::default();
        for entry in entries {
            let local = dest.join(&entry.relative);
            if entry.is_directory {
                plan.dirs.push(local);
            } else {
                plan.files.push((entry.path.clone(), local));
                plan.total += entry.size;
            }
        }
        plan
    }
}

/// 下载目标：`dest` 为已存在目录时写入 `dest/basename(src)`，否则 `dest` 即目标文件
async fn resolve_target(dest: &Path, src: &str) -> PathBuf {
    let is_dir = tokio::fs::metadata(dest)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        dest.join(path::basename(src))
    } else {
        dest.to_path_buf()
    }
}

async fn prepare_destination(dest: &Path) -> Result<(), SessionError> {
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| SessionError::local_fs("create directory", dest, e))
}

// TODO: restrict skeleton directory permissions to the invoking user
async fn create_skeleton_dir(dir: &Path) -> Result<(), SessionError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);
    builder
        .create(dir)
        .await
        .map_err(|e| SessionError::local_fs("create directory", dir, e))
}

/// 创建或截断本地目标文件
async fn open_local_target(target: &Path) -> Result<tokio::fs::File, SessionError> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
        .open(target)
        .await
        .map_err(|e| SessionError::local_fs("create file", target, e))
}

/// 单文件复制；每写入一块就累加计数器
async fn copy_file(
    sftp: &SftpSession,
    host: &str,
    src: &str,
    target: &Path,
    counter: &TransferCounter,
) -> Result<(), SessionError> {
    let mut remote = sftp
        .open(src)
        .await
        .map_err(|e| remote_fs(host, "open", src, e))?;

    let mut local = open_local_target(target).await?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = remote
            .read(&mut buffer)
            .await
            .map_err(|e| transfer_error(host, src, e))?;
        if n == 0 {
            break;
        }
        local
            .write_all(&buffer[..n])
            .await
            .map_err(|e| SessionError::local_fs("write file", target, e))?;
        counter.add(n as u64);
    }

    local
        .flush()
        .await
        .map_err(|e| SessionError::local_fs("write file", target, e))?;

    debug!("[SFTP] Copied '{}' to '{}'", src, target.display());
    Ok(())
}
