//! Rewrites module specifiers between file-relative and absolute form.
//!
//! The agent sees a test whose relative imports have been made absolute so it
//! can request dependencies by path no matter where the file lives. Before a
//! candidate is written next to the source test, absolute specifiers are
//! turned back into paths relative to that file.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::path::{is_relative_ref, to_absolute, to_relative};

/// `import ... from '<spec>'` and `export ... from '<spec>'` statements,
/// side-effect `import '<spec>'`, `import('<spec>')`, `require('<spec>')` and
/// the `jest.mock` family. Statement forms must start a line or follow `;`, so
/// `from "/x"` inside a string literal is left alone.
static SPECIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)(?P<head>(?:^|;)\s*(?:import|export)\b[^;'"`]*?\bfrom\s+|(?:^|;)\s*import\s+|\bimport\s*\(\s*|\brequire\s*\(\s*|\bjest\.(?:mock|unmock|doMock|requireActual)\s*\(\s*)(?P<quote>['"])(?P<spec>[^'"\n]+)['"]"#,
    )
    .expect("specifier pattern should be valid")
});

/// Make every relative specifier in `content` absolute, resolved against
/// `origin`, the file the content belongs to.
pub fn absolutize_imports(content: &str, origin: &Path) -> String {
    rewrite(content, |spec| {
        is_relative_ref(spec).then(|| to_absolute(spec, origin).to_string_lossy().into_owned())
    })
}

/// Make every absolute specifier in `content` relative to `origin`.
pub fn relativize_imports(content: &str, origin: &Path) -> String {
    rewrite(content, |spec| {
        spec.starts_with('/')
            .then(|| to_relative(origin, Path::new(spec)))
    })
}

fn rewrite<F>(content: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    SPECIFIER_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let spec = &caps["spec"];
            match map(spec) {
                Some(replacement) => {
                    let quote = &caps["quote"];
                    format!("{}{quote}{replacement}{quote}", &caps["head"])
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
