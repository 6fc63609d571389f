/// Integration tests for local process execution
///
/// These tests verify that the engine:
/// 1. Captures stdout, stderr and the exit code
/// 2. Feeds stdin and honours the working directory
/// 3. Kills programs that exceed their timeout
/// 4. Rejects invocations it cannot run
///
/// They need a POSIX `sh`.

#[cfg(test)]
mod process_engine_tests {
    use crate::engine::{Invocation, ProcessEngine};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn sh(script: &str, dir: &Path) -> Invocation {
        Invocation::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            dir,
        )
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessEngine::new()
            .execute(&sh("echo hello", dir.path()))
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "");
        assert_eq!(output.exit_code, Some(0));
        assert!(!output.timed_out);
        assert!(!output.exited_abnormally());
    }

    #[tokio::test]
    async fn test_captures_stderr_and_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessEngine::new()
            .execute(&sh("echo oops >&2; exit 3", dir.path()))
            .await
            .unwrap();

        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.exit_code, Some(3));
        assert!(output.exited_abnormally());
        assert!(!output.killed());
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = sh("read a; read b; echo $((a + b))", dir.path())
            .stdin(Some("20\n22\n".to_string()));

        let output = ProcessEngine::new().execute(&invocation).await.unwrap();

        assert_eq!(output.stdout, "42\n");
    }

    #[tokio::test]
    async fn test_no_stdin_reads_eof() {
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessEngine::new()
            .execute(&sh("cat; echo done", dir.path()))
            .await
            .unwrap();

        assert_eq!(output.stdout, "done\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("input.txt"), "from file").unwrap();

        let output = ProcessEngine::new()
            .execute(&sh("cat input.txt", dir.path()))
            .await
            .unwrap();

        assert_eq!(output.stdout, "from file");
    }

    #[tokio::test]
    async fn test_relative_program_resolves_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("prog");
        fs::write(&script, "#!/bin/sh\necho \"args: $*\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let invocation = Invocation::new(
            vec!["./prog".to_string(), "a".to_string(), "b c".to_string()],
            dir.path(),
        );
        let output = ProcessEngine::new().execute(&invocation).await.unwrap();

        assert_eq!(output.stdout, "args: a b c\n");
        assert_eq!(invocation.command_line(), "./prog a 'b c'");
    }

    #[tokio::test]
    async fn test_timeout_kills_program() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = sh("sleep 10", dir.path()).timeout_ms(200);

        let output = ProcessEngine::new().execute(&invocation).await.unwrap();

        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(output.execution_time_ms < 5000);
        assert!(!output.killed());
    }

    #[tokio::test]
    async fn test_signal_has_no_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = ProcessEngine::new()
            .execute(&sh("kill -9 $$", dir.path()))
            .await
            .unwrap();

        assert!(!output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(output.killed());
    }

    #[tokio::test]
    async fn test_rejects_empty_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation::new(Vec::new(), dir.path());

        let err = ProcessEngine::new().execute(&invocation).await.unwrap_err();

        assert!(err.to_string().contains("empty command line"));
    }

    #[tokio::test]
    async fn test_rejects_oversized_input() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = sh("cat", dir.path()).stdin(Some("too long".to_string()));

        let err = ProcessEngine::with_max_stdin_bytes(4)
            .execute(&invocation)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("exceeds maximum size of 4 bytes"));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation::new(vec!["./does-not-exist".to_string()], dir.path());

        let err = ProcessEngine::new().execute(&invocation).await.unwrap_err();

        assert!(err.to_string().contains("Failed to start './does-not-exist'"));
    }
}
