use microk8s_agent::core::error::AgentError;
use microk8s_agent::core::external_action::{CommandOutput, CommandRunner, HostCapability};
use microk8s_agent::plugins::host::{Host, HostActions};
use microk8s_agent::plugins::status::{self, WorkloadState};
use std::cell::RefCell;

#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<(HostCapability, String, Vec<String>)>>,
}

impl CommandRunner for Recorder {
    fn run(
        &self,
        capability: HostCapability,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, AgentError> {
        self.calls
            .borrow_mut()
            .push((capability, program.to_string(), args.to_vec()));
        Ok(CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        })
    }
}

#[test]
fn valid_states_are_forwarded() {
    for state in WorkloadState::ALL {
        let runner = Recorder::default();
        status::status_set(&runner, state.as_str(), "msg").unwrap();
        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, HostCapability::StatusReport);
        assert_eq!(calls[0].1, "status-set");
        assert_eq!(calls[0].2, vec![state.as_str(), "msg"]);
    }
}

#[test]
fn invalid_states_never_reach_the_host() {
    for bad in ["", "ACTIVE", "error", "unknown", "terminated", "active "] {
        let runner = Recorder::default();
        let err = status::status_set(&runner, bad, "msg").unwrap_err();
        assert!(
            matches!(err, AgentError::InvalidArgument(_)),
            "{bad:?} should be rejected"
        );
        assert!(runner.calls.borrow().is_empty());
    }
}

#[test]
fn host_report_status_validates_too() {
    let host = Host::new(Recorder::default(), false);
    assert!(host.report_status("broken", "nope").is_err());
    assert!(host.runner().calls.borrow().is_empty());

    host.report_status("active", "Ready!").unwrap();
    assert_eq!(
        host.runner().calls.borrow()[0].2,
        vec!["active", "Ready!"]
    );
}

#[test]
fn state_names_parse_and_display() {
    assert_eq!("waiting".parse::<WorkloadState>().unwrap(), WorkloadState::Waiting);
    assert_eq!(WorkloadState::Blocked.to_string(), "blocked");
}

#[test]
fn non_zero_status_set_propagates() {
    struct Failing;
    impl CommandRunner for Failing {
        fn run(
            &self,
            _capability: HostCapability,
            _program: &str,
            _args: &[String],
        ) -> Result<CommandOutput, AgentError> {
            Ok(CommandOutput {
                code: Some(2),
                stdout: String::new(),
                stderr: "ERROR not in hook context".to_string(),
            })
        }
    }
    let err = status::status_set(&Failing, "active", "Ready!").unwrap_err();
    assert!(matches!(err, AgentError::CommandFailed { code: Some(2), .. }));
}
