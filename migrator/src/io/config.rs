//! Migrator configuration stored under `.migrator/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::BudgetTracker;
use crate::core::capability::CapabilityKind;
use crate::core::convergence::ConvergencePolicy;

/// Location of the config file relative to the working root.
pub const CONFIG_RELATIVE_PATH: &str = ".migrator/config.toml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_RELATIVE_PATH)
}

/// Migrator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
/// Plain values must stay ahead of the nested tables for TOML serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigratorConfig {
    /// Ceiling on submitted candidates per run.
    pub max_attempts: u32,

    /// Ceiling on agent calls per run, including protocol corrections.
    pub max_agent_turns: u32,

    /// Trailing identical success rates that count as stagnation.
    pub stagnation_window: u32,

    /// Minimum submissions before stagnation is considered.
    pub stagnation_min_attempts: u32,

    /// Whether a failed type-check keeps a passing run from being accepted.
    pub type_check_gates_success: bool,

    /// Offer `propose_source_edit` to the agent.
    pub allow_source_edits: bool,

    /// Inserted before the first extension of the source name to form the
    /// candidate path (`Button.test.tsx` -> `Button.migrated.test.tsx`).
    pub output_infix: String,

    /// Byte budget for the rendered task prompt.
    pub prompt_budget_bytes: usize,

    /// Extra migration instructions appended to the system prompt.
    pub instructions_path: Option<PathBuf>,

    /// When set, per-attempt artifacts are written below this directory.
    pub attempt_log_dir: Option<PathBuf>,

    pub budget: BudgetLimits,
    pub agent: AgentSettings,
    pub test_runner: TestRunnerConfig,
    pub type_check: TypeCheckConfig,
    pub locator: LocatorConfig,
    pub references: ReferenceConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetLimits {
    pub read_file: u32,
    pub find_reference_examples: u32,
    pub propose_source_edit: u32,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            read_file: 3,
            find_reference_examples: 1,
            propose_source_edit: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: Some(0.2),
            max_tokens: None,
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestRunnerConfig {
    /// Shell command; `{file}` is replaced with the quoted candidate path.
    pub command: String,
    pub timeout_secs: u64,
    /// Truncate captured runner output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            command: "npx jest --ci --colors=false {file}".to_string(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TypeCheckConfig {
    /// Shell command; unset disables the type-check step.
    pub command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TypeCheckConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocatorConfig {
    /// Extensions tried, in priority order, when a reference has none.
    pub extensions: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            extensions: ["tsx", "ts", "jsx", "js"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReferenceConfig {
    pub default_depth: u32,
    pub max_results: usize,
    /// Tokens that mark a test as already using the target framework.
    pub signature_tokens: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            default_depth: 2,
            max_results: 3,
            signature_tokens: [
                "@testing-library/react",
                "@testing-library/user-event",
                "screen.getBy",
                "screen.findBy",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// File name suffixes that identify test files.
    pub test_suffixes: Vec<String>,
    /// Directory names never descended into (hidden directories are always skipped).
    pub skip_dirs: Vec<String>,
    /// Tokens that mark a test as still written for the source framework.
    pub source_tokens: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            test_suffixes: [
                ".test.tsx",
                ".test.ts",
                ".test.jsx",
                ".test.js",
                ".spec.tsx",
                ".spec.ts",
                ".spec.jsx",
                ".spec.js",
            ]
            .map(String::from)
            .to_vec(),
            skip_dirs: ["node_modules", "dist", "build", "coverage"]
                .map(String::from)
                .to_vec(),
            source_tokens: ["from 'enzyme'", "from \"enzyme\"", "shallow(", "mount("]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_agent_turns: 20,
            stagnation_window: 3,
            stagnation_min_attempts: 3,
            type_check_gates_success: true,
            allow_source_edits: true,
            output_infix: "migrated".to_string(),
            prompt_budget_bytes: 120_000,
            instructions_path: None,
            attempt_log_dir: None,
            budget: BudgetLimits::default(),
            agent: AgentSettings::default(),
            test_runner: TestRunnerConfig::default(),
            type_check: TypeCheckConfig::default(),
            locator: LocatorConfig::default(),
            references: ReferenceConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl MigratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.max_agent_turns < self.max_attempts {
            return Err(anyhow!("max_agent_turns must be >= max_attempts"));
        }
        if self.stagnation_window < 2 {
            return Err(anyhow!("stagnation_window must be >= 2"));
        }
        if self.output_infix.trim().is_empty() {
            return Err(anyhow!("output_infix must be non-empty"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.agent.model.trim().is_empty() || self.agent.base_url.trim().is_empty() {
            return Err(anyhow!("agent.model and agent.base_url must be non-empty"));
        }
        if self.agent.request_timeout_secs == 0 {
            return Err(anyhow!("agent.request_timeout_secs must be > 0"));
        }
        if self.test_runner.command.trim().is_empty() {
            return Err(anyhow!("test_runner.command must be non-empty"));
        }
        if self.test_runner.timeout_secs == 0 || self.type_check.timeout_secs == 0 {
            return Err(anyhow!("runner timeouts must be > 0"));
        }
        if self.test_runner.output_limit_bytes == 0 {
            return Err(anyhow!("test_runner.output_limit_bytes must be > 0"));
        }
        if let Some(command) = &self.type_check.command
            && command.trim().is_empty()
        {
            return Err(anyhow!("type_check.command must be non-empty when set"));
        }
        if self.locator.extensions.is_empty() {
            return Err(anyhow!("locator.extensions must be a non-empty array"));
        }
        if self.references.max_results == 0 {
            return Err(anyhow!("references.max_results must be > 0"));
        }
        if self.discovery.test_suffixes.is_empty() {
            return Err(anyhow!("discovery.test_suffixes must be a non-empty array"));
        }
        Ok(())
    }

    pub fn convergence_policy(&self) -> ConvergencePolicy {
        ConvergencePolicy {
            max_attempts: self.max_attempts,
            stagnation_window: self.stagnation_window,
            stagnation_min_attempts: self.stagnation_min_attempts,
            type_check_gates_success: self.type_check_gates_success,
        }
    }

    /// Fresh budget tracker; source edits get no budget when disabled.
    pub fn budget_tracker(&self) -> BudgetTracker {
        let edits = if self.allow_source_edits {
            self.budget.propose_source_edit
        } else {
            0
        };
        BudgetTracker::with_limits([
            (CapabilityKind::ReadFile, self.budget.read_file),
            (
                CapabilityKind::FindReferenceExamples,
                self.budget.find_reference_examples,
            ),
            (CapabilityKind::ProposeSourceEdit, edits),
        ])
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MigratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<MigratorConfig> {
    if !path.exists() {
        let cfg = MigratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MigratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MigratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
