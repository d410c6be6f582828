//! Finds nearby tests that already use the target framework.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::io::config::{DiscoveryConfig, ReferenceConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceExample {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ReferenceFinder {
    default_depth: u32,
    max_results: usize,
    signature_tokens: Vec<String>,
    test_suffixes: Vec<String>,
    skip_dirs: Vec<String>,
}

impl ReferenceFinder {
    pub fn from_config(references: &ReferenceConfig, discovery: &DiscoveryConfig) -> Self {
        Self {
            default_depth: references.default_depth,
            max_results: references.max_results,
            signature_tokens: references.signature_tokens.clone(),
            test_suffixes: discovery.test_suffixes.clone(),
            skip_dirs: discovery.skip_dirs.clone(),
        }
    }

    /// Search below the directory `depth` levels above `test_path`.
    ///
    /// Files in `exclude` are never returned. Tests matching a keyword are
    /// ranked before tests that only match a signature token. Any failure
    /// yields an empty list.
    #[instrument(skip_all, fields(test = %test_path.display()))]
    pub fn find(
        &self,
        test_path: &Path,
        depth: Option<u32>,
        keywords: &[String],
        exclude: &[PathBuf],
    ) -> Vec<ReferenceExample> {
        match self.try_find(test_path, depth.unwrap_or(self.default_depth), keywords, exclude) {
            Ok(found) => {
                debug!(count = found.len(), "reference examples found");
                found
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "reference search failed");
                Vec::new()
            }
        }
    }

    fn try_find(
        &self,
        test_path: &Path,
        depth: u32,
        keywords: &[String],
        exclude: &[PathBuf],
    ) -> Result<Vec<ReferenceExample>> {
        let root = search_root(test_path, depth);
        let keywords: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();

        let mut keyword_hits = Vec::new();
        let mut signature_hits = Vec::new();

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_skipped(entry));
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if !entry.file_type().is_file() || !self.is_test_file(entry.path()) {
                continue;
            }
            if exclude.iter().any(|p| p == entry.path()) {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            let example = ReferenceExample {
                path: entry.path().to_string_lossy().into_owned(),
                content,
            };
            if keywords.iter().any(|k| example.content.contains(k)) {
                keyword_hits.push(example);
            } else if self
                .signature_tokens
                .iter()
                .any(|t| example.content.contains(t.as_str()))
            {
                signature_hits.push(example);
            }
            if keyword_hits.len() >= self.max_results {
                break;
            }
        }

        keyword_hits.extend(signature_hits);
        keyword_hits.truncate(self.max_results);
        Ok(keyword_hits)
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.skip_dirs.iter().any(|d| d.as_str() == name)
    }

    fn is_test_file(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.test_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }
}

fn search_root(test_path: &Path, depth: u32) -> PathBuf {
    let mut root = test_path.parent().unwrap_or(test_path);
    for _ in 0..depth {
        match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => root = parent,
            _ => break,
        }
    }
    root.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder() -> ReferenceFinder {
        ReferenceFinder::from_config(&ReferenceConfig::default(), &DiscoveryConfig::default())
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    const RTL: &str = "import { render } from '@testing-library/react';\n";

    #[test]
    fn finds_signature_matches_within_depth() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("app/src");
        let test = src.join("Button/Button.test.tsx");
        write(&test, "import { shallow } from 'enzyme';\n");
        write(&src.join("Card/Card.test.tsx"), RTL);
        write(&src.join("Card/Card.tsx"), RTL);
        write(&src.join("Old/Old.test.tsx"), "import { mount } from 'enzyme';\n");
        write(&temp.path().join("other/Far.test.tsx"), RTL);

        let found = finder().find(&test, Some(1), &[], &[test.clone()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, src.join("Card/Card.test.tsx").to_string_lossy());
    }

    #[test]
    fn skips_node_modules_and_hidden_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let test = temp.path().join("src/a/A.test.tsx");
        write(&test, "");
        write(&temp.path().join("src/node_modules/x/X.test.tsx"), RTL);
        write(&temp.path().join("src/.cache/Y.test.tsx"), RTL);

        assert!(finder().find(&test, Some(1), &[], &[]).is_empty());
    }

    #[test]
    fn keyword_matches_rank_first_and_results_are_capped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("src");
        let test = dir.join("Z.test.tsx");
        write(&test, "");
        write(&dir.join("A.test.tsx"), RTL);
        write(&dir.join("B.test.tsx"), RTL);
        write(&dir.join("C.test.tsx"), RTL);
        write(&dir.join("D.test.tsx"), "userEvent.click(button)\n");

        let found = finder().find(&test, Some(0), &["userEvent".to_string()], &[]);
        let names: Vec<String> = found
            .iter()
            .map(|e| {
                Path::new(&e.path)
                    .file_name()
                    .expect("name")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["D.test.tsx", "A.test.tsx", "B.test.tsx"]);
    }

    #[test]
    fn missing_root_degrades_to_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let test = temp.path().join("missing/dir/A.test.tsx");
        assert!(finder().find(&test, Some(0), &[], &[]).is_empty());
    }
}
