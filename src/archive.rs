// 采集目录打包（ZIP）

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AgentError;

/// 大于该值的条目需要 ZIP64
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

struct Entry {
    path: PathBuf,
    /// 相对打包根目录、以 '/' 分隔的名称
    name: String,
    is_dir: bool,
}

/// 把 `source` 目录打包为 `target`
/// 条目名相对 `source`；目录以 '/' 结尾；`.tar` 文件不压缩，其余使用 DEFLATE
pub fn zip_directory(source: &Path, target: &Path) -> Result<usize, AgentError> {
    let archive_error = |source: zip::result::ZipError| AgentError::Archive {
        path: target.to_path_buf(),
        source,
    };

    let entries = walk(source).map_err(|e| archive_error(e.into()))?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options
        .open(target)
        .map_err(|e| AgentError::local_fs("create archive", target, e))?;

    let mut writer = ZipWriter::new(file);
    for entry in &entries {
        if entry.is_dir {
            writer
                .add_directory(entry.name.as_str(), FileOptions::default())
                .map_err(archive_error)?;
            continue;
        }

        let mut file = File::open(&entry.path).map_err(|e| archive_error(e.into()))?;
        let size = file.metadata().map_err(|e| archive_error(e.into()))?.len();

        let method = if is_tarball(&entry.path) {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let options = FileOptions::default()
            .compression_method(method)
            .large_file(size >= ZIP64_THRESHOLD);

        writer
            .start_file(entry.name.as_str(), options)
            .map_err(archive_error)?;
        io::copy(&mut file, &mut writer).map_err(|e| archive_error(e.into()))?;
        debug!("Archived '{}' ({} bytes)", entry.name, size);
    }

    writer.finish().map_err(archive_error)?;
    Ok(entries.len())
}

fn is_tarball(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "tar")
}

/// 按名称排序的先序遍历，不含根目录本身
fn walk(root: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    walk_into(root, "", &mut entries)?;
    Ok(entries)
}

fn walk_into(dir: &Path, prefix: &str, out: &mut Vec<Entry>) -> io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let file_name = child.file_name();
        let name = format!("{}{}", prefix, file_name.to_string_lossy());
        let path = child.path();

        if child.file_type()?.is_dir() {
            let dir_name = format!("{}/", name);
            out.push(Entry {
                path: path.clone(),
                name: dir_name.clone(),
                is_dir: true,
            });
            walk_into(&path, &dir_name, out)?;
        } else {
            out.push(Entry {
                path,
                name,
                is_dir: false,
            });
        }
    }
    Ok(())
}
