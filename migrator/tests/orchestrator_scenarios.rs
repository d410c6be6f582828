//! End-to-end orchestration scenarios with a scripted agent and runner.
//!
//! Each test lays out a small project in a temp dir, scripts the agent's
//! replies and the runner's results, and checks how the run terminates.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde_json::json;

use migrator::core::types::Role;
use migrator::io::config::MigratorConfig;
use migrator::orchestrator::{
    ExhaustedReason, FatalReason, MigrationRequest, RunOutcome, Termination, run_migration,
};
use migrator::test_support::{
    ScriptedAgent, ScriptedValidationRunner, calls, failing_result, invocation, passing_result,
    prose, submit,
};

struct Project {
    _temp: tempfile::TempDir,
    root: PathBuf,
    source: PathBuf,
}

impl Project {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("app");
        let src = root.join("src/components");
        fs::create_dir_all(&src).expect("mkdir");
        fs::write(
            src.join("Button.tsx"),
            "export const Button = ({ label }) => <button>{label}</button>;\n",
        )
        .expect("write component");
        let source = src.join("Button.test.tsx");
        fs::write(
            &source,
            "import { shallow } from 'enzyme';\nimport { Button } from './Button';\n\n\
             it('renders', () => {\n  expect(shallow(<Button label=\"Hi\" />).text()).toBe('Hi');\n});\n",
        )
        .expect("write test");
        Self {
            _temp: temp,
            root,
            source,
        }
    }

    fn request(&self) -> MigrationRequest {
        MigrationRequest {
            source_path: self.source.clone(),
            output_path: None,
            workdir: self.root.clone(),
        }
    }

    fn output(&self) -> PathBuf {
        self.source.with_file_name("Button.migrated.test.tsx")
    }

    fn component(&self) -> PathBuf {
        self.source.with_file_name("Button.tsx")
    }
}

/// Operator messages from the transcript written to the attempt log.
fn operator_texts(log_dir: &Path) -> Vec<String> {
    let transcript: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(log_dir.join("transcript.json")).expect("transcript"),
    )
    .expect("json");
    transcript["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter(|m| m["role"] == json!(Role::Operator))
        .filter_map(|m| m["content"].as_str().map(str::to_string))
        .collect()
}

fn run(
    project: &Project,
    config: &MigratorConfig,
    agent: &ScriptedAgent,
    validator: &ScriptedValidationRunner,
) -> RunOutcome {
    run_migration(config, &project.request(), agent, validator).expect("run")
}

#[test]
fn success_on_third_submission_stops_without_further_calls() {
    let project = Project::new();
    let agent = ScriptedAgent::new(vec![
        submit("s1", "attempt one"),
        submit("s2", "attempt two"),
        submit("s3", "attempt three"),
        submit("s4", "never sent"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![
        failing_result(1, 4),
        failing_result(2, 4),
        passing_result(4),
    ]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert_eq!(outcome.termination, Termination::Passed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(agent.calls(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(outcome.result, Some(passing_result(4)));
    assert_eq!(outcome.output_path, project.output());
    assert_eq!(
        fs::read_to_string(project.output()).expect("read"),
        "attempt three"
    );
}

#[test]
fn identical_rates_stagnate_on_the_third_attempt() {
    let project = Project::new();
    let agent = ScriptedAgent::new(vec![
        submit("s1", "a"),
        submit("s2", "b"),
        submit("s3", "c"),
        submit("s4", "d"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![
        failing_result(2, 4),
        failing_result(2, 4),
        failing_result(2, 4),
    ]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert_eq!(outcome.termination, Termination::Stagnated);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(agent.calls(), 3);
    assert_eq!(outcome.result, Some(failing_result(2, 4)));
}

#[test]
fn strictly_improving_failures_use_every_attempt() {
    let project = Project::new();
    let agent = ScriptedAgent::new(
        (1..=6)
            .map(|n| submit(&format!("s{n}"), &format!("attempt {n}")))
            .collect(),
    );
    let validator = ScriptedValidationRunner::new(
        (1..=5).map(|passed| failing_result(passed, 10)).collect(),
    );

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert_eq!(
        outcome.termination,
        Termination::Exhausted {
            reason: ExhaustedReason::Attempts
        }
    );
    assert_eq!(agent.calls(), 5);
    assert_eq!(outcome.attempts, 5);
    assert_eq!(outcome.result, Some(failing_result(5, 10)));
}

#[test]
fn malformed_submission_ends_the_run_without_a_result() {
    let project = Project::new();
    let agent = ScriptedAgent::new(vec![
        calls(vec![invocation("s1", "submit_candidate", json!({"code": "x"}))]),
        submit("s2", "never sent"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(1)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert!(matches!(
        outcome.termination,
        Termination::Fatal {
            reason: FatalReason::MalformedSubmission(_)
        }
    ));
    assert_eq!(outcome.result, None);
    assert_eq!(agent.calls(), 1);
    assert_eq!(validator.calls(), 0);
    assert!(!project.output().exists());
}

#[test]
fn over_budget_source_edit_has_no_side_effect() {
    let project = Project::new();
    let edit = |id: &str, content: &str| {
        invocation(
            id,
            "propose_source_edit",
            json!({
                "path": "./Button",
                "newContent": content,
                "explanation": "add aria-label"
            }),
        )
    };
    let agent = ScriptedAgent::new(vec![
        calls(vec![edit("e1", "first edit\n"), edit("e2", "second edit\n")]),
        submit("s1", "done"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(1)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert_eq!(outcome.termination, Termination::Passed);
    assert_eq!(
        fs::read_to_string(project.component()).expect("read"),
        "first edit\n"
    );
    // The exhausted capability is no longer offered on the next turn.
    let offered = agent.offered();
    assert!(offered[0].contains(&"propose_source_edit".to_string()));
    assert!(!offered[1].contains(&"propose_source_edit".to_string()));
    assert!(offered[1].contains(&"submit_candidate".to_string()));
}

#[test]
fn disabled_source_edits_are_never_offered_or_applied() {
    let project = Project::new();
    let config = MigratorConfig {
        allow_source_edits: false,
        ..MigratorConfig::default()
    };
    let agent = ScriptedAgent::new(vec![
        calls(vec![invocation(
            "e1",
            "propose_source_edit",
            json!({"path": "./Button", "newContent": "x", "explanation": "y"}),
        )]),
        submit("s1", "done"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(1)]);

    let outcome = run(&project, &config, &agent, &validator);

    assert!(outcome.passed());
    assert!(
        agent
            .offered()
            .iter()
            .all(|names| !names.contains(&"propose_source_edit".to_string()))
    );
    assert!(
        fs::read_to_string(project.component())
            .expect("read")
            .contains("<button>")
    );
}

#[test]
fn prose_reply_gets_a_correction_without_using_an_attempt() {
    let project = Project::new();
    let agent = ScriptedAgent::new(vec![
        prose("Here is the migrated test: ..."),
        submit("s1", "done"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(2)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert!(outcome.passed());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.agent_calls, 2);
    // system + task, then + agent prose + correction.
    assert_eq!(agent.transcript_lengths(), vec![2, 4]);
}

#[test]
fn endless_prose_hits_the_agent_turn_ceiling() {
    let project = Project::new();
    let config = MigratorConfig {
        max_attempts: 2,
        max_agent_turns: 3,
        ..MigratorConfig::default()
    };
    let agent = ScriptedAgent::new((0..5).map(|_| prose("thinking")).collect());
    let validator = ScriptedValidationRunner::new(vec![]);

    let outcome = run(&project, &config, &agent, &validator);

    assert_eq!(
        outcome.termination,
        Termination::Exhausted {
            reason: ExhaustedReason::AgentTurns
        }
    );
    assert_eq!(agent.calls(), 3);
    assert_eq!(outcome.result, None);
}

#[test]
fn agent_failure_is_fatal_and_discards_earlier_results() {
    let project = Project::new();
    let agent = ScriptedAgent::with_results(vec![
        Ok(submit("s1", "first")),
        Err(anyhow!("connection reset")),
    ]);
    let validator = ScriptedValidationRunner::new(vec![failing_result(1, 2)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert_eq!(
        outcome.termination,
        Termination::Fatal {
            reason: FatalReason::AgentCall("connection reset".to_string())
        }
    );
    assert_eq!(outcome.result, None);
    assert_eq!(outcome.attempts, 1);
}

#[test]
fn passing_submission_skips_the_rest_of_the_turn() {
    let project = Project::new();
    let agent = ScriptedAgent::new(vec![calls(vec![
        invocation("s1", "submit_candidate", json!({"file": "good"})),
        invocation("s2", "submit_candidate", json!({"file": "ignored"})),
    ])]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(1), passing_result(1)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert!(outcome.passed());
    assert_eq!(validator.calls(), 1);
    assert_eq!(fs::read_to_string(project.output()).expect("read"), "good");
}

#[test]
fn source_imports_are_absolute_for_the_agent_and_relative_on_disk() {
    let project = Project::new();
    let component = project.source.with_file_name("Button");
    let submitted = format!("import {{ Button }} from '{}';\n", component.display());
    let agent = ScriptedAgent::new(vec![
        calls(vec![invocation(
            "r1",
            "read_file",
            json!({ "absolutePath": component.display().to_string() }),
        )]),
        submit("s1", &submitted),
    ]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(1)]);

    let outcome = run(&project, &MigratorConfig::default(), &agent, &validator);

    assert!(outcome.passed());
    assert_eq!(
        validator.candidates(),
        vec!["import { Button } from './Button';\n".to_string()]
    );
}

#[test]
fn repeated_failures_nudge_towards_unused_capabilities() {
    let project = Project::new();
    let config = MigratorConfig {
        attempt_log_dir: Some(PathBuf::from(".migrator/attempts")),
        ..MigratorConfig::default()
    };
    let agent = ScriptedAgent::new(vec![
        submit("s1", "a"),
        submit("s2", "b"),
        submit("s3", "c"),
    ]);
    let validator = ScriptedValidationRunner::new(vec![
        failing_result(1, 4),
        failing_result(2, 4),
        passing_result(4),
    ]);

    let outcome = run(&project, &config, &agent, &validator);
    assert!(outcome.passed());

    let log_dir = project.root.join(".migrator/attempts/src/components/Button.test.tsx");
    let texts = operator_texts(&log_dir);
    // task, feedback after attempt 1, feedback after attempt 2.
    assert_eq!(texts.len(), 3);
    assert!(!texts[1].contains("You have not used"));
    assert!(texts[2].contains("You have not used"));
    assert!(texts[2].contains("propose_source_edit"));

    for attempt in 1..=3 {
        let dir = log_dir.join(format!("attempt-{attempt}"));
        assert!(dir.join("meta.json").is_file());
        assert!(dir.join("candidate.tsx").is_file());
        assert!(dir.join("runner.log").is_file());
    }
    assert!(log_dir.join("state.json").is_file());
}

#[test]
fn failed_type_check_keeps_a_passing_run_going_when_gated() {
    let project = Project::new();
    let config = MigratorConfig {
        attempt_log_dir: Some(PathBuf::from(".migrator/attempts")),
        ..MigratorConfig::default()
    };
    let agent = ScriptedAgent::new(vec![submit("s1", "typed badly"), submit("s2", "typed well")]);
    let validator = ScriptedValidationRunner::new(vec![
        passing_result(4).with_type_check(false),
        passing_result(4).with_type_check(true),
    ]);

    let outcome = run(&project, &config, &agent, &validator);

    assert_eq!(outcome.termination, Termination::Passed);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(agent.calls(), 2);
    assert_eq!(
        outcome.result.and_then(|r| r.type_check_passed),
        Some(true)
    );
    let log_dir = project.root.join(".migrator/attempts/src/components/Button.test.tsx");
    let texts = operator_texts(&log_dir);
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("type check reported errors"));
}

#[test]
fn failed_type_check_is_ignored_when_not_gated() {
    let project = Project::new();
    let config = MigratorConfig {
        type_check_gates_success: false,
        ..MigratorConfig::default()
    };
    let agent = ScriptedAgent::new(vec![submit("s1", "typed badly"), submit("s2", "never sent")]);
    let validator =
        ScriptedValidationRunner::new(vec![passing_result(4).with_type_check(false)]);

    let outcome = run(&project, &config, &agent, &validator);

    assert_eq!(outcome.termination, Termination::Passed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(agent.calls(), 1);
    assert_eq!(
        outcome.result.and_then(|r| r.type_check_passed),
        Some(false)
    );
}

#[test]
fn rerun_replaces_earlier_attempt_logs() {
    let project = Project::new();
    let config = MigratorConfig {
        attempt_log_dir: Some(PathBuf::from(".migrator/attempts")),
        ..MigratorConfig::default()
    };
    let log_dir = project.root.join(".migrator/attempts/src/components/Button.test.tsx");

    let agent = ScriptedAgent::new(vec![submit("s1", "a"), submit("s2", "b")]);
    let validator = ScriptedValidationRunner::new(vec![failing_result(1, 4), passing_result(4)]);
    assert!(run(&project, &config, &agent, &validator).passed());
    assert!(log_dir.join("attempt-2").is_dir());

    let agent = ScriptedAgent::new(vec![submit("s1", "c")]);
    let validator = ScriptedValidationRunner::new(vec![passing_result(4)]);
    assert!(run(&project, &config, &agent, &validator).passed());
    assert!(log_dir.join("attempt-1").is_dir());
    assert!(!log_dir.join("attempt-2").exists());
}

#[test]
fn missing_source_is_an_error() {
    let project = Project::new();
    let request = MigrationRequest {
        source_path: Path::new("src/Nope.test.tsx").to_path_buf(),
        output_path: None,
        workdir: project.root.clone(),
    };
    let agent = ScriptedAgent::new(vec![]);
    let validator = ScriptedValidationRunner::new(vec![]);

    let err = run_migration(&MigratorConfig::default(), &request, &agent, &validator)
        .expect_err("missing source");
    assert!(err.to_string().contains("read source test"));
    assert_eq!(agent.calls(), 0);
}
