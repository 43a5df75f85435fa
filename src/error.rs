use itertools::Itertools;
use miette::{Diagnostic, Report};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GuardError {
    #[error("{deployment}: precondition not met: {reason}")]
    #[diagnostic(code(dockguard::precondition))]
    PreconditionUnmet {
        deployment: String,
        reason: String,
        #[help]
        help: Option<String>,
    },
    #[error("{deployment}: failed to check for an existing resource: {reason}")]
    #[diagnostic(code(dockguard::probe))]
    Probe { deployment: String, reason: String },
    #[error("{deployment}: step {index}/{total} ({step}) failed: {reason}")]
    #[diagnostic(
        code(dockguard::step),
        help("completed steps are not rolled back, fix the cause and deploy again")
    )]
    StepFailed {
        deployment: String,
        step: String,
        index: usize,
        total: usize,
        reason: String,
    },
}

/// Flatten a report and its causes into a single line
pub fn reason(report: &Report) -> String {
    report.chain().join(": ")
}

#[test]
fn test_reason_includes_causes() {
    use miette::WrapErr;

    let report = Err::<(), _>(Report::msg("connection refused"))
        .wrap_err("Docker daemon is not reachable")
        .unwrap_err();
    assert_eq!(
        reason(&report),
        "Docker daemon is not reachable: connection refused"
    );
}

#[test]
fn test_step_failure_message() {
    let err = GuardError::StepFailed {
        deployment: "watchtower".into(),
        step: "start container watchtower".into(),
        index: 3,
        total: 3,
        reason: "port already allocated".into(),
    };
    assert_eq!(
        err.to_string(),
        "watchtower: step 3/3 (start container watchtower) failed: port already allocated"
    );
}
