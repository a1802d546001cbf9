// pair-core/src/project.rs

//! Project directory listing and file-selection checks.

use anyhow::{anyhow, Result};
use ignore::WalkBuilder;
use std::path::{Component, Path};
use tracing::{debug, info};

/// Lists regular files under `root`, one `./relative/path` per line, sorted.
///
/// Honours `.gitignore` files and skips hidden entries.
pub fn list_project_files(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(anyhow!("Project root is not a directory: {:?}", root));
    }

    let mut walker_builder = WalkBuilder::new(root);
    walker_builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        // .gitignore is honoured even outside a git checkout
        .require_git(false)
        .parents(true);

    let mut files = Vec::new();
    for result in walker_builder.build() {
        match result {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                if let Ok(relative) = entry.path().strip_prefix(root) {
                    let display = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    files.push(format!("./{}", display));
                }
            }
            Err(err) => {
                debug!("Warning during directory walk: {}", err);
            }
        }
    }
    files.sort();
    info!(num_files = files.len(), root = ?root, "Listed project files.");

    let mut output = files.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }
    Ok(output)
}

/// Fails with a message naming the first of `filenames` that is not a file under `root`.
///
/// Absolute names, `..` components and symlinks leading out of `root` are rejected even
/// when the target exists.
pub fn validate_file_selection(root: &Path, filenames: &[String]) -> Result<(), String> {
    for name in filenames {
        if !is_project_relative(Path::new(name)) || !resolves_under(root, name) {
            return Err(format!(
                "Not a project file: {}. Choose only files from the project listing.",
                name
            ));
        }
        if !root.join(name).is_file() {
            return Err(format!(
                "File not found: {}. Choose only files from the project listing.",
                name
            ));
        }
    }
    Ok(())
}

/// True when `path` only walks down from wherever it is joined (`./a/b`, `a/b`).
fn is_project_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::CurDir | Component::Normal(_)))
}

fn resolves_under(root: &Path, name: &str) -> bool {
    match (root.canonicalize(), root.join(name).canonicalize()) {
        (Ok(root), Ok(target)) => target.starts_with(root),
        // missing files are reported as not found by the caller
        _ => true,
    }
}
