//! The closed set of capabilities the agent may invoke.
//!
//! Each capability has a JSON schema presented to the agent and a typed
//! argument struct. [`decode`] turns a raw invocation into a [`Capability`]
//! by parsing the argument string, validating it against the schema, and
//! deserializing it.

use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::types::CapabilityInvocation;

/// Capability identifiers, in the order they are offered to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    ReadFile,
    FindReferenceExamples,
    ProposeSourceEdit,
    SubmitCandidate,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::ReadFile,
        CapabilityKind::FindReferenceExamples,
        CapabilityKind::ProposeSourceEdit,
        CapabilityKind::SubmitCandidate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityKind::ReadFile => "read_file",
            CapabilityKind::FindReferenceExamples => "find_reference_examples",
            CapabilityKind::ProposeSourceEdit => "propose_source_edit",
            CapabilityKind::SubmitCandidate => "submit_candidate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Submissions are bounded by the attempt ceiling, not the budget tracker.
    pub fn is_budgeted(self) -> bool {
        !matches!(self, CapabilityKind::SubmitCandidate)
    }

    fn description(self) -> &'static str {
        match self {
            CapabilityKind::ReadFile => {
                "Read a file referenced by the test, such as the component under test. \
                 Give either `path` relative to `currentFilePath`, or `absolutePath`. \
                 The response starts with the absolute path of the file that was read."
            }
            CapabilityKind::FindReferenceExamples => {
                "Find up to three existing tests near the current test that already use \
                 the target testing library, to copy their conventions."
            }
            CapabilityKind::ProposeSourceEdit => {
                "Replace the full content of a source file (not the test) with a minimally \
                 changed version, for example to add a test id attribute. Preserve everything \
                 else byte for byte."
            }
            CapabilityKind::SubmitCandidate => {
                "Submit the complete migrated test file. It is written to disk and executed \
                 with the test runner; the results are returned."
            }
        }
    }

    /// JSON schema for the capability's arguments.
    pub fn parameters(self) -> Value {
        match self {
            CapabilityKind::ReadFile => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Import path as written in the current file, e.g. ./Button"
                    },
                    "currentFilePath": {
                        "type": "string",
                        "description": "Absolute path of the file containing the import"
                    },
                    "absolutePath": {
                        "type": "string",
                        "description": "Absolute path of the file to read"
                    }
                },
                "required": []
            }),
            CapabilityKind::FindReferenceExamples => json!({
                "type": "object",
                "properties": {
                    "currentTestPath": {
                        "type": "string",
                        "description": "Absolute path of the test being migrated"
                    },
                    "searchDepth": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "How many parent directories to search upwards (default 2)"
                    },
                    "keywords": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Extra tokens that a useful example should contain"
                    }
                },
                "required": ["currentTestPath"]
            }),
            CapabilityKind::ProposeSourceEdit => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Import path of the source file, relative to currentFilePath"
                    },
                    "currentFilePath": {
                        "type": "string",
                        "description": "Absolute path of the file containing the import"
                    },
                    "absolutePath": {
                        "type": "string",
                        "description": "Absolute path of the source file"
                    },
                    "newContent": {
                        "type": "string",
                        "description": "Complete new content of the source file"
                    },
                    "explanation": {
                        "type": "string",
                        "description": "Why the edit is required"
                    }
                },
                "required": ["newContent", "explanation"]
            }),
            CapabilityKind::SubmitCandidate => json!({
                "type": "object",
                "properties": {
                    "file": {
                        "type": "string",
                        "description": "Complete content of the migrated test file"
                    }
                },
                "required": ["file"]
            }),
        }
    }

    pub fn schema(self) -> CapabilitySchema {
        CapabilitySchema {
            name: self.as_str(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema surface presented to the agent for one capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilitySchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Where a file argument points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTarget {
    /// An import-style reference; `origin` defaults to the test being migrated.
    Relative {
        reference: String,
        origin: Option<String>,
    },
    Absolute(String),
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn file_target(
    path: Option<&str>,
    current_file_path: Option<&str>,
    absolute_path: Option<&str>,
) -> Option<FileTarget> {
    if let Some(absolute) = non_empty(absolute_path) {
        return Some(FileTarget::Absolute(absolute.to_string()));
    }
    let reference = non_empty(path)?;
    Some(FileTarget::Relative {
        reference: reference.to_string(),
        origin: non_empty(current_file_path).map(str::to_string),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
    pub path: Option<String>,
    pub current_file_path: Option<String>,
    pub absolute_path: Option<String>,
}

impl ReadFileArgs {
    pub fn target(&self) -> Option<FileTarget> {
        file_target(
            self.path.as_deref(),
            self.current_file_path.as_deref(),
            self.absolute_path.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindReferencesArgs {
    pub current_test_path: String,
    pub search_depth: Option<u32>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeEditArgs {
    pub path: Option<String>,
    pub current_file_path: Option<String>,
    pub absolute_path: Option<String>,
    pub new_content: String,
    pub explanation: String,
}

impl ProposeEditArgs {
    pub fn target(&self) -> Option<FileTarget> {
        file_target(
            self.path.as_deref(),
            self.current_file_path.as_deref(),
            self.absolute_path.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitArgs {
    pub file: String,
}

/// A decoded invocation with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    ReadFile(ReadFileArgs),
    FindReferences(FindReferencesArgs),
    ProposeEdit(ProposeEditArgs),
    Submit(SubmitArgs),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::ReadFile(_) => CapabilityKind::ReadFile,
            Capability::FindReferences(_) => CapabilityKind::FindReferenceExamples,
            Capability::ProposeEdit(_) => CapabilityKind::ProposeSourceEdit,
            Capability::Submit(_) => CapabilityKind::SubmitCandidate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("malformed arguments for `{kind}`: {message}")]
    MalformedArguments {
        kind: CapabilityKind,
        message: String,
    },
}

/// Decode a raw invocation into a typed capability.
pub fn decode(invocation: &CapabilityInvocation) -> Result<Capability, DecodeError> {
    let kind = CapabilityKind::from_name(&invocation.name)
        .ok_or_else(|| DecodeError::UnknownCapability(invocation.name.clone()))?;
    let capability = match kind {
        CapabilityKind::ReadFile => Capability::ReadFile(decode_args(kind, &invocation.arguments)?),
        CapabilityKind::FindReferenceExamples => {
            Capability::FindReferences(decode_args(kind, &invocation.arguments)?)
        }
        CapabilityKind::ProposeSourceEdit => {
            Capability::ProposeEdit(decode_args(kind, &invocation.arguments)?)
        }
        CapabilityKind::SubmitCandidate => {
            Capability::Submit(decode_args(kind, &invocation.arguments)?)
        }
    };
    Ok(capability)
}

fn decode_args<T: DeserializeOwned>(kind: CapabilityKind, raw: &str) -> Result<T, DecodeError> {
    let malformed = |message: String| DecodeError::MalformedArguments { kind, message };

    let value: Value =
        serde_json::from_str(raw).map_err(|err| malformed(format!("invalid json: {err}")))?;
    let schema = kind.parameters();
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| malformed(format!("schema: {err}")))?;
    let violations: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(malformed(violations.join("; ")));
    }
    serde_json::from_value(value).map_err(|err| malformed(err.to_string()))
}
