use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

pub(crate) fn create_dir_if_not_exist(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Err(e) = create_dir_all(path) {
            error!("Failed to create directory {:?}: {:?}", path, e);
            return Err(StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
        debug!("created directory: {:?}", path);
    }
    Ok(())
}

pub(crate) fn open_file_for_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| {
            StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            }
            .into()
        })
}

/// Append `buf` to the file, writing `header` first when the file is new or empty.
///
/// Synchronous on purpose: it is used both from blocking workers and from the
/// shutdown backup pass, which must complete before the process exits.
pub(crate) fn append_with_header(
    path: &Path,
    header: &[u8],
    buf: &[u8],
) -> Result<()> {
    let mut file = open_file_for_append(path)?;
    let len = file
        .metadata()
        .map_err(|e| StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    let mut out = Vec::with_capacity(header.len() + buf.len());
    if len == 0 {
        out.extend_from_slice(header);
    }
    out.extend_from_slice(buf);

    file.write_all(&out)
        .and_then(|_| file.flush())
        .map_err(|e| StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(())
}

/// List every regular file in `dir` carrying the given extension.
pub(crate) async fn list_files_with_extension(
    dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| StorageError::PathError {
        path: dir.to_path_buf(),
        source: e,
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(StorageError::IoError)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let file_type = entry.file_type().await.map_err(|e| StorageError::PathError {
            path: path.clone(),
            source: e,
        })?;
        if file_type.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) async fn delete_file(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await.map_err(|e| {
        StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()
    })
}
