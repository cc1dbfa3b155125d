//! Chain execution with real processes

use pretty_assertions::assert_eq;
use shell_api::config::CommandSpec;
use shell_api::engine::{ChainError, ChainExecutor, ExecutionRequest, MergeError};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(["sh", "-c", script])
}

#[tokio::test]
async fn test_later_steps_never_run_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let chain = vec![
        sh("echo one"),
        sh("echo two"),
        sh("echo partial; echo broken >&2; exit 4"),
        CommandSpec::new(["touch".to_string(), marker.display().to_string()]),
    ];

    let outcome = ChainExecutor::default()
        .execute(&chain, &ExecutionRequest::default())
        .await
        .unwrap();

    assert!(!outcome.succeeded());
    assert!(!marker.exists());

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.command, vec!["sh", "-c", "echo partial; echo broken >&2; exit 4"]);
    assert_eq!(failure.error.as_deref(), Some("broken\n"));
    assert_eq!(failure.report.as_deref(), Some("partial\n"));
    assert_eq!(failure.previous, "one\n\ntwo\n");
    assert_eq!(failure.exit_code, 4);
}

#[tokio::test]
async fn test_request_args_reach_every_step() {
    let chain = vec![
        CommandSpec {
            prepend_args: vec!["first:".to_string()],
            ..CommandSpec::new(["echo"])
        },
        CommandSpec {
            append_args: vec![":second".to_string()],
            ..CommandSpec::new(["echo"])
        },
    ];

    let outcome = ChainExecutor::default()
        .execute(&chain, &ExecutionRequest::with_args(["x", "y"]))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.report, "first: x y\n\nx y :second\n");
    assert_eq!(outcome.last_command, vec!["echo", "x", "y", ":second"]);
}

#[tokio::test]
async fn test_static_step_ignores_request() {
    let spec = CommandSpec {
        is_static: true,
        append_args: vec!["constant".to_string()],
        ..CommandSpec::new(["echo"])
    };
    let executor = ChainExecutor::default();

    let a = executor
        .execute(&[spec.clone()], &ExecutionRequest::with_args(["one"]))
        .await
        .unwrap();
    let b = executor
        .execute(&[spec], &ExecutionRequest::with_args(["two", "three"]))
        .await
        .unwrap();

    assert_eq!(a.report, "constant\n");
    assert_eq!(a.last_command, b.last_command);
    assert_eq!(a.report, b.report);
}

#[tokio::test]
async fn test_file_write_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let chain = vec![
        CommandSpec {
            working_dir: Some(dir.path().to_path_buf()),
            file_targets: vec!["a.txt".to_string(), "b.txt".to_string()],
            captures_output: false,
            ..CommandSpec::default()
        },
        CommandSpec {
            working_dir: Some(dir.path().to_path_buf()),
            ..CommandSpec::new(["cat", "a.txt", "b.txt"])
        },
    ];

    let outcome = ChainExecutor::default()
        .execute(&chain, &ExecutionRequest::with_args(["x\n", "y\n"]))
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.report, "x\ny\n");
}

#[tokio::test]
async fn test_file_write_step_forwards_remaining_args() {
    let dir = tempfile::tempdir().unwrap();
    let chain = vec![CommandSpec {
        working_dir: Some(dir.path().to_path_buf()),
        file_targets: vec!["a".to_string(), "b".to_string()],
        prepend_args: vec!["got".to_string()],
        ..CommandSpec::new(["echo"])
    }];

    let outcome = ChainExecutor::default()
        .execute(&chain, &ExecutionRequest::with_args(["x", "y", "z"]))
        .await
        .unwrap();

    assert_eq!(outcome.last_command, vec!["echo", "got", "z"]);
    assert_eq!(outcome.report, "got z\n");
    assert_eq!(std::fs::read_to_string(dir.path().join("a")).unwrap(), "x");
    assert_eq!(std::fs::read_to_string(dir.path().join("b")).unwrap(), "y");
}

#[tokio::test]
async fn test_invalid_base64_stops_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let chain = vec![
        CommandSpec {
            working_dir: Some(dir.path().to_path_buf()),
            file_targets: vec!["payload".to_string()],
            ..CommandSpec::default()
        },
        CommandSpec::new(["touch".to_string(), marker.display().to_string()]),
    ];
    let request = ExecutionRequest {
        decode64: true,
        ..ExecutionRequest::with_args(["%%%"])
    };

    let err = ChainExecutor::default()
        .execute(&chain, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Arguments(MergeError::InvalidBase64 { .. })));
    assert!(!dir.path().join("payload").exists());
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_timeout_fails_the_chain() {
    let chain = vec![sh("echo before"), sh("sleep 30"), sh("echo after")];
    let request = ExecutionRequest {
        timeout: 1,
        ..ExecutionRequest::default()
    };

    let outcome = ChainExecutor::default().execute(&chain, &request).await.unwrap();

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.error.as_deref(), Some("command timed out after 1 seconds"));
    assert_eq!(failure.previous, "before\n");
    assert!(outcome.last_result.unwrap().timed_out);
}

#[tokio::test]
async fn test_missing_executable_fails_the_chain() {
    let chain = vec![CommandSpec::new(["no-such-program-anywhere"])];

    let outcome = ChainExecutor::default()
        .execute(&chain, &ExecutionRequest::default())
        .await
        .unwrap();

    let failure = outcome.failure.unwrap();
    assert_eq!(failure.report, None);
    assert_eq!(failure.exit_code, -1);
}
