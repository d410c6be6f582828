//! Enumerates test files that still use the source framework.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::io::config::DiscoveryConfig;

/// Test files under `root` that contain a source-framework token, sorted by
/// path. Hidden directories and configured skip dirs are not descended into.
/// Migrated candidates (file names containing `.<infix>.`) are ignored.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover_tests(root: &Path, config: &DiscoveryConfig, infix: &str) -> Result<Vec<PathBuf>> {
    let candidate_marker = format!(".{infix}.");
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry, config));
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !config.test_suffixes.iter().any(|s| name.ends_with(s.as_str()))
            || name.contains(&candidate_marker)
        {
            continue;
        }
        let content = fs::read_to_string(entry.path())
            .with_context(|| format!("read {}", entry.path().display()))?;
        if config.source_tokens.iter().any(|t| content.contains(t.as_str())) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    debug!(count = found.len(), "discovered tests");
    Ok(found)
}

fn is_skipped(entry: &DirEntry, config: &DiscoveryConfig) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || config.skip_dirs.iter().any(|d| d.as_str() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    #[test]
    fn finds_only_enzyme_tests_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write(&root.join("src/b/B.test.tsx"), "const w = shallow(<B />);");
        write(&root.join("src/a/A.spec.js"), "import { mount } from 'enzyme';");
        write(&root.join("src/c/C.test.tsx"), "render(<C />);");
        write(&root.join("src/a/A.tsx"), "shallow(");
        write(&root.join("src/b/B.migrated.test.tsx"), "shallow(");
        write(&root.join("node_modules/x/X.test.js"), "shallow(");
        write(&root.join(".git/Y.test.js"), "shallow(");

        let found = discover_tests(root, &DiscoveryConfig::default(), "migrated").expect("discover");
        assert_eq!(
            found,
            vec![root.join("src/a/A.spec.js"), root.join("src/b/B.test.tsx")]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = discover_tests(&temp.path().join("nope"), &DiscoveryConfig::default(), "migrated")
            .expect_err("missing root");
        assert!(err.to_string().contains("walk"));
    }
}
