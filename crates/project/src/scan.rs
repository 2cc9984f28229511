use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::store::{ItemSnapshot, ProjectSnapshot};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to walk project directory: {0}")]
    Walk(#[from] walkdir::Error),
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds a project named after `root` with one folder per directory and one
/// file node per file. Hidden entries are skipped.
/// 掃描目錄並建立對應的專案結構（略過隱藏檔案）。
pub fn scan_directory(root: impl AsRef<Path>) -> Result<ProjectSnapshot, ScanError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| display(root));
    let mut project = ProjectSnapshot::new(name);
    project.path = Some(display(root));

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parents: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        let Some(items) = folder_items(&mut project.items, &parents) else {
            continue;
        };
        let leaf = entry.file_name().to_string_lossy().into_owned();
        let path = display(entry.path());
        if entry.file_type().is_dir() {
            items.push(ItemSnapshot::Folder {
                name: leaf,
                path: Some(path),
                items: Vec::new(),
            });
        } else {
            items.push(ItemSnapshot::File { path, name: None });
        }
    }

    tracing::debug!(project = %project.name, items = project.items.len(), "directory scanned");
    Ok(project)
}

/// Walks down `parents` through already-created folders.
fn folder_items<'a>(
    mut items: &'a mut Vec<ItemSnapshot>,
    parents: &[String],
) -> Option<&'a mut Vec<ItemSnapshot>> {
    for parent in parents {
        items = items.iter_mut().find_map(|item| match item {
            ItemSnapshot::Folder { name, items, .. } if name == parent => Some(items),
            _ => None,
        })?;
    }
    Some(items)
}
