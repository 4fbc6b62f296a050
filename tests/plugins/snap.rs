use microk8s_agent::core::error::AgentError;
use microk8s_agent::core::external_action::{CommandOutput, CommandRunner, HostCapability};
use microk8s_agent::plugins::snap::{self, SnapOptions};
use std::cell::RefCell;

/// Runner that records invocations and answers with a canned output.
struct ScriptedRunner {
    reply: Result<CommandOutput, fn() -> AgentError>,
    calls: RefCell<Vec<(HostCapability, String, Vec<String>)>>,
}

impl ScriptedRunner {
    fn replying(code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            reply: Ok(CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn failing_to_spawn() -> Self {
        Self {
            reply: Err(|| {
                AgentError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "snap: not found",
                ))
            }),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        capability: HostCapability,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, AgentError> {
        self.calls
            .borrow_mut()
            .push((capability, program.to_string(), args.to_vec()));
        match &self.reply {
            Ok(out) => Ok(out.clone()),
            Err(make) => Err(make()),
        }
    }
}

#[test]
fn default_options_emit_only_the_channel() {
    assert_eq!(SnapOptions::default().args(), vec!["--channel=stable"]);
    assert_eq!(
        snap::install_args("microk8s", &SnapOptions::default()).unwrap(),
        vec!["install", "--channel=stable", "microk8s"]
    );
}

#[test]
fn devmode_with_revision_keeps_flag_order() {
    let opts = SnapOptions {
        devmode: true,
        revision: Some(42),
        ..SnapOptions::default()
    };
    assert_eq!(
        opts.args(),
        vec!["--channel=stable", "--devmode", "--revision=42"]
    );
}

#[test]
fn all_flags_follow_the_fixed_order() {
    let opts = SnapOptions {
        channel: "1.28/edge".to_string(),
        jailmode: true,
        dangerous: true,
        classic: true,
        revision: Some(7),
        ..SnapOptions::default()
    };
    assert_eq!(
        opts.args(),
        vec![
            "--channel=1.28/edge",
            "--jailmode",
            "--dangerous",
            "--classic",
            "--revision=7"
        ]
    );
}

#[test]
fn devmode_and_jailmode_conflict() {
    let opts = SnapOptions {
        devmode: true,
        jailmode: true,
        ..SnapOptions::default()
    };
    let runner = ScriptedRunner::replying(0, "", "");
    let err = snap::install(&runner, "microk8s", &opts).unwrap_err();
    assert!(matches!(err, AgentError::InvalidArgument(_)));
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn install_runs_snap_and_returns_combined_output() {
    let runner = ScriptedRunner::replying(0, "microk8s v1.28.3 installed\n", "");
    let out = snap::install(&runner, "microk8s", &SnapOptions::default()).unwrap();

    assert_eq!(out, "microk8s v1.28.3 installed");
    let calls = runner.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, HostCapability::SnapInstall);
    assert_eq!(calls[0].1, "snap");
    assert_eq!(calls[0].2, vec!["install", "--channel=stable", "microk8s"]);
}

#[test]
fn install_failure_carries_diagnostics() {
    let runner = ScriptedRunner::replying(1, "", "error: cannot install \"microk8s\": store unreachable");
    let err = snap::install(&runner, "microk8s", &SnapOptions::default()).unwrap_err();
    match err {
        AgentError::CommandFailed { command, code, output } => {
            assert_eq!(command, "snap install --channel=stable microk8s");
            assert_eq!(code, Some(1));
            assert!(output.contains("store unreachable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn presence_query_true_on_success() {
    let runner = ScriptedRunner::replying(
        0,
        "Name      Version  Rev   Tracking       Publisher   Notes\nmicrok8s  v1.28.3  6089  1.28/stable    canonical✓  classic\n",
        "",
    );
    assert!(snap::is_installed(&runner, "microk8s").unwrap());
    let calls = runner.calls.borrow();
    assert_eq!(calls[0].0, HostCapability::SnapQuery);
    assert_eq!(calls[0].2, vec!["list", "microk8s"]);
}

#[test]
fn presence_query_false_when_not_found() {
    let runner = ScriptedRunner::replying(1, "", "error: no matching snaps installed\n");
    assert!(!snap::is_installed(&runner, "microk8s").unwrap());
}

#[test]
fn presence_query_errors_on_unexpected_failure() {
    let runner = ScriptedRunner::replying(1, "", "error: cannot communicate with server");
    assert!(matches!(
        snap::is_installed(&runner, "microk8s"),
        Err(AgentError::CommandFailed { .. })
    ));

    let missing_tool = ScriptedRunner::failing_to_spawn();
    assert!(matches!(
        snap::is_installed(&missing_tool, "microk8s"),
        Err(AgentError::IoError(_))
    ));
}
