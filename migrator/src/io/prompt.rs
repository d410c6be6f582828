//! Builds the system and task messages that open every migration run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::capability::CapabilityKind;
use crate::io::config::MigratorConfig;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Droppable system sections, least important first.
const SYSTEM_DROP_ORDER: [&str; 2] = ["instructions", "limits"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section pattern should be valid")
});

#[derive(Debug, Clone, Serialize)]
struct LimitContext {
    name: &'static str,
    limit: u32,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("task", TASK_TEMPLATE)
            .expect("task template should be valid");
        Self { env }
    }

    fn render_system(&self, input: &PromptInputs) -> Result<String> {
        let limits: Vec<LimitContext> = input
            .limits
            .iter()
            .filter(|(_, limit)| *limit > 0)
            .map(|(kind, limit)| LimitContext {
                name: kind.as_str(),
                limit: *limit,
            })
            .collect();
        let references_offered = limits
            .iter()
            .any(|l| l.name == CapabilityKind::FindReferenceExamples.as_str());
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! {
            max_attempts => input.max_attempts,
            source_edits => input.source_edits,
            references_offered => references_offered,
            limits => limits,
            instructions => input.instructions.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }

    fn render_task(&self, input: &PromptInputs) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template.render(context! {
            source_path => input.source_path.display().to_string(),
            output_path => input.output_path.display().to_string(),
            language => fence_language(&input.source_path),
            source_content => input.source_content.trim_end(),
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let required = kind.as_str() == "required";
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());

        let content = rendered[marker.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop droppable sections in `drop_order` until the total fits, then
/// truncate the last section if it still does not.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in drop_order {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let other_len = total - last.content.len();
    let allowed = budget.saturating_sub(other_len);
    let before_len = last.content.len();
    let marker = "\n[truncated]";
    let keep = floor_char_boundary(&last.content, allowed.saturating_sub(marker.len()));
    last.content.truncate(keep);
    if allowed > marker.len() {
        last.content.push_str(marker);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn fence_language(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts") => "ts",
        Some("jsx") => "jsx",
        Some("js") => "js",
        _ => "tsx",
    }
}

/// All inputs needed to open a run.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    /// Source test with relative imports already made absolute.
    pub source_content: String,
    /// Per-capability call limits for this run.
    pub limits: Vec<(CapabilityKind, u32)>,
    pub max_attempts: u32,
    pub source_edits: bool,
    /// Project-specific guidance from `instructions_path`.
    pub instructions: Option<String>,
}

impl PromptInputs {
    pub fn from_config(
        config: &MigratorConfig,
        source_path: &Path,
        output_path: &Path,
        source_content: String,
    ) -> Result<Self> {
        let budget = config.budget_tracker();
        let limits = CapabilityKind::ALL
            .into_iter()
            .filter_map(|kind| budget.entry(kind).map(|entry| (kind, entry.limit)))
            .collect();
        let instructions = match &config.instructions_path {
            Some(path) => Some(
                fs::read_to_string(path)
                    .with_context(|| format!("read instructions {}", path.display()))?,
            ),
            None => None,
        };
        Ok(Self {
            source_path: source_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            source_content,
            limits,
            max_attempts: config.max_attempts,
            source_edits: config.allow_source_edits,
            instructions,
        })
    }
}

/// The opening system and task messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: String,
    pub task: String,
}

/// Builds prompt packs within a byte budget per message.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build(&self, input: &PromptInputs) -> Result<PromptPack> {
        let engine = PromptEngine::new();

        let mut system = parse_sections(&engine.render_system(input).context("render system prompt")?);
        apply_budget_to_sections(&mut system, self.budget_bytes, &SYSTEM_DROP_ORDER);

        let mut task = parse_sections(&engine.render_task(input).context("render task prompt")?);
        apply_budget_to_sections(&mut task, self.budget_bytes, &[]);

        Ok(PromptPack {
            system: render_sections(&system),
            task: render_sections(&task),
        })
    }
}
