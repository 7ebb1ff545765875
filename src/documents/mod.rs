use crate::error::DocumentError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Document name (file stem) -> text
pub type DocumentSet = BTreeMap<String, String>;

fn build_globset(patterns: &[String]) -> Result<GlobSet, DocumentError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| DocumentError::GlobPattern {
            pattern: pattern.clone(),
            source: e,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DocumentError::GlobPattern {
        pattern: "include set".to_string(),
        source: e,
    })
}

/// Read the source documents directly inside `dir` whose file names match `include`.
///
/// Unreadable files are logged and skipped; only a missing directory is an error.
pub fn read_documents(dir: &Path, include: &[String]) -> Result<DocumentSet, DocumentError> {
    if !dir.is_dir() {
        return Err(DocumentError::NotFound(dir.to_path_buf()));
    }
    let include_set = build_globset(include)?;

    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut documents = DocumentSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name() else {
            continue;
        };
        if !include.is_empty() && !include_set.is_match(Path::new(file_name)) {
            continue;
        }
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };

        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Loaded document {} ({} bytes)", stem, content.len());
                documents.insert(stem, content);
            }
            Err(e) => warn!("Error reading file {}: {}", path.display(), e),
        }
    }

    Ok(documents)
}
