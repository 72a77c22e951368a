// 远程路径工具（远程主机总是使用 '/' 分隔）

/// 去掉多余的尾部 '/'，根目录保持为 "/"
pub fn clean(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// 拼接目录与名称
pub fn join(dir: &str, name: &str) -> String {
    let dir = clean(dir);
    let name = name.trim_start_matches('/');
    if dir == "/" {
        format!("/{}", name)
    } else if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// 路径最后一段
pub fn basename(path: &str) -> &str {
    let path = clean(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// `path` 相对 `root` 的部分；不在 `root` 之下时返回 None
pub fn relative<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let root = clean(root);
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        Some("")
    } else if root == "/" {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/var/log/cassandra", "gc.log.0"), "/var/log/cassandra/gc.log.0");
        assert_eq!(join("/var/log/cassandra/", "gc.log.0"), "/var/log/cassandra/gc.log.0");
        assert_eq!(join("/", "tmp"), "/tmp");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/tmp/InstaclustrCollection.tar"), "InstaclustrCollection.tar");
        assert_eq!(basename("/var/data/snapshots/x/"), "x");
        assert_eq!(basename("system.log"), "system.log");
    }

    #[test]
    fn test_relative() {
        assert_eq!(relative("/var/data/snap", "/var/data/snap/01E4/meta.json"), Some("01E4/meta.json"));
        assert_eq!(relative("/var/data/snap/", "/var/data/snap"), Some(""));
        assert_eq!(relative("/var/data/snap", "/var/data/snapshot"), None);
        assert_eq!(relative("/", "/etc/hosts"), Some("etc/hosts"));
    }
}
