mod text;

use std::path::{Path, PathBuf};

pub use text::TextLoader;

use super::DocumentError;

/// Collect files under `root` whose extension is in `extensions`, sorted by path.
///
/// A file path is returned as-is when its extension matches.
///
/// # Errors
///
/// Returns an error if `root` or one of its subdirectories cannot be read.
pub async fn discover(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, DocumentError> {
    let matches = |path: &Path| {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    };

    let meta = tokio::fs::metadata(root).await?;
    if meta.is_file() {
        return if matches(root) {
            Ok(vec![root.to_path_buf()])
        } else {
            Err(DocumentError::UnsupportedFormat(root.display().to_string()))
        };
    }

    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && matches(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
