//! Corpus loader.
//!
//! Walks the corpus root recursively and reads every file whose extension
//! is in the configured set. Structured records (`.json`) are flattened
//! into `key: value` lines so they chunk on natural boundaries; everything
//! else is used verbatim.
//!
//! Files that are not valid UTF-8 (or cannot be read) are skipped with a
//! warning. A missing root is fatal.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{RagError, Result};
use crate::models::{DocumentFormat, RawDocument};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/node_modules/**"];

/// Load every recognized document under `root`.
///
/// `root` is passed separately from `config` so a build can target a
/// different directory than the configured default.
pub fn load_documents(root: &Path, config: &CorpusConfig) -> Result<Vec<RawDocument>> {
    if !root.is_dir() {
        return Err(RagError::CorpusNotFound {
            path: root.to_path_buf(),
        });
    }

    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut docs = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => continue,
        };
        if !extensions.contains(&ext) {
            continue;
        }

        if let Some(doc) = read_document(path, rel_str, DocumentFormat::from_extension(&ext)) {
            docs.push(doc);
        }
    }

    docs.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    debug!(root = %root.display(), count = docs.len(), "corpus scanned");

    Ok(docs)
}

fn read_document(path: &Path, source_path: String, format: DocumentFormat) -> Option<RawDocument> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %source_path, error = %e, "skipping file that could not be read");
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => {
            warn!(path = %source_path, "skipping file that is not valid UTF-8 text");
            return None;
        }
    };

    let content = match format {
        DocumentFormat::Structured => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => flatten_json(&value),
            Err(e) => {
                warn!(path = %source_path, error = %e, "invalid JSON, indexing as plain text");
                text
            }
        },
        DocumentFormat::Markdown => text,
    };

    Some(RawDocument {
        source_path,
        format,
        content,
    })
}

/// Render a JSON value as one `path: value` line per leaf.
///
/// Nested object keys are joined with `.`, array items are indexed as
/// `key[i]`. A bare scalar renders as itself.
pub fn flatten_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    flatten_into(value, "", &mut out);
    out
}

fn flatten_into(value: &serde_json::Value, path: &str, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                flatten_into(v, &child, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, &format!("{}[{}]", path, i), out);
            }
        }
        Value::Null => {}
        scalar => {
            let rendered = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if path.is_empty() {
                out.push_str(&rendered);
            } else {
                out.push_str(path);
                out.push_str(": ");
                out.push_str(&rendered);
            }
            out.push('\n');
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid exclude glob '{}': {}", pattern, e))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Internal(anyhow::anyhow!("failed to build glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus_config(root: &Path) -> CorpusConfig {
        CorpusConfig {
            root: root.to_path_buf(),
            extensions: vec!["json".to_string(), ".md".to_string()],
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[test]
    fn test_missing_root_is_corpus_not_found() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = load_documents(&missing, &corpus_config(&missing)).unwrap_err();
        assert!(matches!(err, RagError::CorpusNotFound { .. }));
    }

    #[test]
    fn test_recursive_scan_filters_extensions_and_excludes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("services/housing")).unwrap();
        fs::create_dir_all(root.join("drafts")).unwrap();
        fs::write(root.join("intro.md"), "Welcome.").unwrap();
        fs::write(
            root.join("services/housing/residency.json"),
            r#"{"service": "residency certificate"}"#,
        )
        .unwrap();
        fs::write(root.join("services/notes.txt"), "ignored").unwrap();
        fs::write(root.join("drafts/wip.md"), "excluded").unwrap();

        let docs = load_documents(root, &corpus_config(root)).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(paths, vec!["intro.md", "services/housing/residency.json"]);
        assert_eq!(docs[0].format, DocumentFormat::Markdown);
        assert_eq!(docs[1].format, DocumentFormat::Structured);
        assert_eq!(docs[1].content, "service: residency certificate\n");
    }

    #[test]
    fn test_non_utf8_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("good.md"), "Readable.").unwrap();
        fs::write(root.join("bad.md"), [0xffu8, 0xfe, 0x00, 0x81]).unwrap();

        let docs = load_documents(root, &corpus_config(root)).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_path, "good.md");
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("broken.json"), "{ not json").unwrap();

        let docs = load_documents(root, &corpus_config(root)).unwrap();
        assert_eq!(docs[0].content, "{ not json");
    }

    #[test]
    fn test_flatten_nested_json() {
        let value = serde_json::json!({
            "service": "residency certificate",
            "documents": ["lease contract", "utility bill"],
            "office": { "name": "caidat", "open": true },
            "fee": null
        });
        let flat = flatten_json(&value);
        assert!(flat.contains("service: residency certificate\n"));
        assert!(flat.contains("documents[0]: lease contract\n"));
        assert!(flat.contains("documents[1]: utility bill\n"));
        assert!(flat.contains("office.name: caidat\n"));
        assert!(flat.contains("office.open: true\n"));
        assert!(!flat.contains("fee"));
    }
}
