//! Project discovery and per-project database path resolution (spec §6).
//!
//! A "project" is whatever directory upward from the current working
//! directory first looks like the root of a repository. Each project gets
//! its own on-disk database under `<home>/.alexandria/projects/`, keyed by a
//! hash of its absolute path so two projects with the same directory name
//! never collide.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AlexandriaError, Result};

/// Marker files that make a directory a project root (spec §6: "Project
/// discovery").
const ROOT_MARKERS: &[&str] = &[".git", "package.json", "Cargo.toml", "pyproject.toml", "go.mod"];

/// Fallback project name used when no root marker is found anywhere above
/// `start`.
pub const GLOBAL_PROJECT_NAME: &str = "_global";

/// Metadata persisted alongside each project's database (spec §6:
/// "`project.json`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project_path: String,
    pub project_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Walk upward from `start` looking for the nearest ancestor (inclusive)
/// that contains one of [`ROOT_MARKERS`]. `None` means no project root was
/// found and the caller should fall back to [`GLOBAL_PROJECT_NAME`].
pub fn discover_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(candidate) = dir {
        if ROOT_MARKERS.iter().any(|marker| candidate.join(marker).exists()) {
            return Some(candidate.to_path_buf());
        }
        dir = candidate.parent();
    }
    None
}

/// First 12 hex characters of the sha256 of `path`'s string form (spec §6:
/// "`<project-name>_<12-hex-of-sha256(projectPath)>`").
fn path_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| GLOBAL_PROJECT_NAME.to_string())
}

fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| AlexandriaError::Io(std::io::Error::other("could not determine home directory")))
}

/// Resolve the database path and project metadata for the project
/// containing `cwd`, honouring `ALEXANDRIA_DB_PATH` as an override (spec
/// §6). Creates the project directory and writes/refreshes `project.json`
/// if it does not already exist.
pub fn resolve_project(cwd: &Path) -> Result<(PathBuf, ProjectMeta)> {
    if let Ok(explicit) = std::env::var("ALEXANDRIA_DB_PATH") {
        let path = PathBuf::from(explicit);
        let meta = ProjectMeta {
            project_path: cwd.to_string_lossy().to_string(),
            project_name: project_name(cwd),
            created_at: chrono::Utc::now(),
        };
        return Ok((path, meta));
    }

    let home = home_dir()?;
    let base = home.join(".alexandria").join("projects");

    let (dir_name, meta) = match discover_project_root(cwd) {
        Some(root) => {
            let name = project_name(&root);
            let meta = ProjectMeta {
                project_path: root.to_string_lossy().to_string(),
                project_name: name.clone(),
                created_at: chrono::Utc::now(),
            };
            (format!("{name}_{}", path_hash(&root)), meta)
        }
        None => {
            let meta = ProjectMeta {
                project_path: cwd.to_string_lossy().to_string(),
                project_name: GLOBAL_PROJECT_NAME.to_string(),
                created_at: chrono::Utc::now(),
            };
            (GLOBAL_PROJECT_NAME.to_string(), meta)
        }
    };

    let project_dir = base.join(dir_name);
    std::fs::create_dir_all(&project_dir)?;

    let meta_path = project_dir.join("project.json");
    if !meta_path.exists() {
        let json = serde_json::to_string_pretty(&meta).unwrap_or_default();
        std::fs::write(&meta_path, json)?;
    }

    Ok((project_dir.join("alexandria.db"), meta))
}

/// Built-in stoplist of generic words that never count as project keywords
/// (spec §4.J: "built-in stoplist-filtered default set").
const STOPLIST: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "into", "your", "their", "a", "an",
    "is", "are", "was", "were", "to", "of", "in", "on", "it", "as", "by", "be", "or", "at",
];

/// Extract the lowercase keyword vocabulary for `root` from `package.json`
/// (name/description/keywords/bin) plus the first lines of a README (spec
/// §4.J). Falls back to `root`'s directory name alone if neither file is
/// readable.
pub fn project_keywords(root: &Path) -> HashSet<String> {
    let mut words = HashSet::new();

    if let Ok(contents) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&contents) {
            extract_package_json_words(&value, &mut words);
        }
    }

    for readme_name in ["README.md", "README", "readme.md"] {
        if let Ok(contents) = std::fs::read_to_string(root.join(readme_name)) {
            let head: String = contents.lines().take(20).collect::<Vec<_>>().join(" ");
            tokenize_into(&head, &mut words);
            break;
        }
    }

    if words.is_empty() {
        if let Some(name) = root.file_name() {
            tokenize_into(&name.to_string_lossy(), &mut words);
        }
    }

    words.retain(|w| !STOPLIST.contains(&w.as_str()) && w.len() > 1);
    words
}

fn extract_package_json_words(value: &serde_json::Value, out: &mut HashSet<String>) {
    for field in ["name", "description"] {
        if let Some(s) = value.get(field).and_then(|v| v.as_str()) {
            tokenize_into(s, out);
        }
    }
    if let Some(keywords) = value.get("keywords").and_then(|v| v.as_array()) {
        for kw in keywords {
            if let Some(s) = kw.as_str() {
                tokenize_into(s, out);
            }
        }
    }
    if let Some(bin) = value.get("bin") {
        match bin {
            serde_json::Value::String(s) => tokenize_into(s, out),
            serde_json::Value::Object(map) => {
                for key in map.keys() {
                    tokenize_into(key, out);
                }
            }
            _ => {}
        }
    }
}

fn tokenize_into(text: &str, out: &mut HashSet<String>) {
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if !word.is_empty() {
            out.insert(word.to_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_root_via_cargo_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]").unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let root = discover_project_root(&nested).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn no_marker_anywhere_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_project_root(dir.path()).is_none());
    }

    #[test]
    fn path_hash_is_twelve_hex_chars() {
        let hash = path_hash(Path::new("/some/project/path"));
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn project_keywords_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "alexandria-core", "description": "memory substrate", "keywords": ["agents", "memory"]}"#,
        )
        .unwrap();

        let words = project_keywords(dir.path());
        assert!(words.contains("alexandria"));
        assert!(words.contains("memory"));
        assert!(words.contains("agents"));
        assert!(!words.contains("the"));
    }

    #[test]
    fn falls_back_to_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("my-widget-tool");
        std::fs::create_dir_all(&named).unwrap();
        let words = project_keywords(&named);
        assert!(words.contains("widget") || words.contains("tool") || words.contains("my"));
    }
}
