use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Writes data atomically: a temporary sibling file is synced, then renamed
/// over the target.
/// 以臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

fn last_separator(path: &str) -> Option<usize> {
    path.rfind(|c: char| c == '/' || c == '\\')
}

/// Everything before the last separator; empty for bare names.
pub fn parent_path(path: &str) -> &str {
    match last_separator(path) {
        Some(0) => &path[..1],
        Some(index) => &path[..index],
        None => "",
    }
}

/// Last path segment.
pub fn leaf_name(path: &str) -> &str {
    match last_separator(path) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Replaces the last segment of `path` with `name`, keeping its separator.
pub fn with_leaf_name(path: &str, name: &str) -> String {
    match last_separator(path) {
        Some(index) => format!("{}{}", &path[..=index], name),
        None => name.to_string(),
    }
}
