//! Path algebra between import-style relative references and absolute paths.
//!
//! Everything here is lexical: no filesystem access, no symlink resolution,
//! and no failure modes. Malformed input yields a best-effort path.

use std::path::{Component, Path, PathBuf};

/// Resolve `relative_ref` against the directory containing `origin_file`.
///
/// Absolute references are returned normalized and otherwise untouched.
pub fn to_absolute(relative_ref: &str, origin_file: &Path) -> PathBuf {
    let reference = Path::new(relative_ref);
    if reference.is_absolute() {
        return normalize(reference);
    }
    let base = origin_file.parent().unwrap_or_else(|| Path::new(""));
    normalize(&base.join(reference))
}

/// Render `target` relative to the directory containing `origin_file`.
///
/// The result always starts with `./` or `../` and uses `/` separators, so it
/// can be dropped straight into an import specifier.
pub fn to_relative(origin_file: &Path, target: &Path) -> String {
    let base = normalize(origin_file.parent().unwrap_or_else(|| Path::new("")));
    let target = normalize(target);

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in common..base_parts.len() {
        segments.push("..".to_string());
    }
    for part in &target_parts[common..] {
        segments.push(part.as_os_str().to_string_lossy().into_owned());
    }

    match segments.first().map(String::as_str) {
        None => "./".to_string(),
        Some("..") => segments.join("/"),
        Some(_) => format!("./{}", segments.join("/")),
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// `..` at the root is dropped; leading `..` on a relative path is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// True when `reference` is written relative to its file (`./` or `../`).
pub fn is_relative_ref(reference: &str) -> bool {
    reference.starts_with("./") || reference.starts_with("../")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "/repo/src/components/button/Button.test.tsx";

    #[test]
    fn to_absolute_resolves_against_origin_directory() {
        let origin = Path::new(ORIGIN);
        assert_eq!(
            to_absolute("./Button", origin),
            PathBuf::from("/repo/src/components/button/Button")
        );
        assert_eq!(
            to_absolute("../../utils/format", origin),
            PathBuf::from("/repo/src/utils/format")
        );
    }

    #[test]
    fn to_absolute_normalizes_absolute_input() {
        let origin = Path::new(ORIGIN);
        assert_eq!(
            to_absolute("/repo/src/./lib/../hooks/useThing", origin),
            PathBuf::from("/repo/src/hooks/useThing")
        );
    }

    #[test]
    fn to_relative_prefixes_same_directory_with_dot_slash() {
        let origin = Path::new(ORIGIN);
        let target = Path::new("/repo/src/components/button/Button.tsx");
        assert_eq!(to_relative(origin, target), "./Button.tsx");
    }

    #[test]
    fn to_relative_walks_up_with_parent_segments() {
        let origin = Path::new(ORIGIN);
        let target = Path::new("/repo/src/test-utils/render");
        assert_eq!(to_relative(origin, target), "../../test-utils/render");
    }

    #[test]
    fn relative_round_trip_preserves_reference() {
        let origin = Path::new(ORIGIN);
        for reference in [
            "./Button",
            "./styles/button.css",
            "../Icon",
            "../../hooks/useToggle",
            "../../../lib/api/client",
        ] {
            let absolute = to_absolute(reference, origin);
            assert_eq!(to_relative(origin, &absolute), reference, "{reference}");
        }
    }

    #[test]
    fn normalize_drops_parent_at_root() {
        assert_eq!(normalize(Path::new("/../a/./b")), PathBuf::from("/a/b"));
        assert_eq!(normalize(Path::new("../a/../../b")), PathBuf::from("../../b"));
    }

    #[test]
    fn is_relative_ref_only_accepts_dot_prefixes() {
        assert!(is_relative_ref("./a"));
        assert!(is_relative_ref("../a"));
        assert!(!is_relative_ref("react"));
        assert!(!is_relative_ref("/abs/path"));
    }
}
