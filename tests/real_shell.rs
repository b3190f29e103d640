// tests/real_shell.rs

#![cfg(unix)]

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use phpmon_runtime::errors::ShellError;
use phpmon_runtime::exec::{
    pipe_all, spawn_quiet, sync_all, Command, ExitStatus, ProcessRunner, RealShell, ShellConfig,
    Stream, StreamChunk,
};
use phpmon_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn shell() -> RealShell {
    RealShell::new(ShellConfig::plain())
}

fn missing_shell() -> RealShell {
    RealShell::new(ShellConfig {
        program: "/definitely/not/a/shell".to_string(),
        ..ShellConfig::plain()
    })
}

#[tokio::test]
async fn pipe_separates_stdout_and_stderr() -> TestResult {
    init_tracing();

    let output = shell()
        .pipe(&Command::new("printf 'a\\nb\\n'; printf 'oops\\n' 1>&2"))
        .await?;

    assert_eq!(output.out, "a\nb\n");
    assert_eq!(output.err, "oops\n");
    assert!(output.has_error());
    assert!(output.success());
    Ok(())
}

/// A non-zero exit is a status, not an error.
#[tokio::test]
async fn non_zero_exit_is_returned_in_status() -> TestResult {
    init_tracing();

    let output = shell().pipe(&Command::new("echo partial; exit 3")).await?;
    assert_eq!(output.status, ExitStatus::Exited(3));
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.out, "partial\n");

    let blocking = shell().sync(&Command::new("exit 4"))?;
    assert_eq!(blocking.status, ExitStatus::Exited(4));
    Ok(())
}

#[tokio::test]
async fn killed_by_signal_is_reported_as_signaled() -> TestResult {
    init_tracing();

    let output = shell().pipe(&Command::new("kill -9 $$")).await?;
    assert_eq!(output.status, ExitStatus::Signaled(Some(9)));
    assert!(!output.success());
    Ok(())
}

#[tokio::test]
async fn missing_program_fails_to_launch() {
    init_tracing();
    let runner = missing_shell();
    let command = Command::new("echo hi");

    assert!(matches!(
        runner.sync(&command),
        Err(ShellError::LaunchFailed { .. })
    ));
    assert!(matches!(
        runner.pipe(&command).await,
        Err(ShellError::LaunchFailed { .. })
    ));
    assert!(matches!(
        runner
            .attach(&command, Box::new(|_: &StreamChunk| {}), Duration::from_secs(1))
            .await,
        Err(ShellError::LaunchFailed { .. })
    ));
}

/// `quiet` swallows every failure, launch failures included.
#[tokio::test]
async fn quiet_never_surfaces_errors() -> TestResult {
    init_tracing();

    missing_shell().quiet(&Command::new("echo hi")).await;
    shell().quiet(&Command::new("exit 1")).await;

    let runner: Arc<dyn ProcessRunner> = Arc::new(shell());
    spawn_quiet(runner, Command::new("echo background")).await?;
    Ok(())
}

#[tokio::test]
async fn attach_streams_chunks_before_exit() -> TestResult {
    init_tracing();

    let seen: Arc<Mutex<Vec<(Instant, StreamChunk)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let output = shell()
        .attach(
            &Command::new("echo first; sleep 0.3; echo second"),
            Box::new(move |chunk: &StreamChunk| {
                sink.lock().unwrap().push((Instant::now(), chunk.clone()));
            }),
            Duration::from_secs(10),
        )
        .await?;
    let finished = Instant::now();

    let seen = seen.lock().unwrap();
    let texts: Vec<&str> = seen.iter().map(|(_, c)| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first\n", "second\n"]);
    assert!(
        finished.duration_since(seen[0].0) >= Duration::from_millis(200),
        "first chunk should arrive while the command is still sleeping"
    );
    assert_eq!(output.out, "first\nsecond\n");
    Ok(())
}

#[tokio::test]
async fn per_stream_order_is_preserved() -> TestResult {
    init_tracing();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    shell()
        .attach(
            &Command::new("for i in 1 2 3 4 5 6 7 8; do echo out$i; echo err$i 1>&2; done"),
            Box::new(move |chunk: &StreamChunk| sink.lock().unwrap().push(chunk.clone())),
            Duration::from_secs(10),
        )
        .await?;

    let seen = seen.lock().unwrap();
    let of = |stream: Stream| -> Vec<String> {
        seen.iter()
            .filter(|c| c.stream == stream)
            .map(|c| c.text.trim_end().to_string())
            .collect()
    };

    let expected_out: Vec<String> = (1..=8).map(|i| format!("out{i}")).collect();
    let expected_err: Vec<String> = (1..=8).map(|i| format!("err{i}")).collect();
    assert_eq!(of(Stream::Stdout), expected_out);
    assert_eq!(of(Stream::Stderr), expected_err);
    Ok(())
}

#[tokio::test]
async fn attach_timeout_returns_promptly() {
    init_tracing();

    let started = Instant::now();
    let result = shell()
        .attach(
            &Command::new("sleep 30"),
            Box::new(|_: &StreamChunk| {}),
            Duration::from_millis(100),
        )
        .await;

    assert!(matches!(result, Err(ShellError::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn pipe_honours_default_timeout() {
    init_tracing();

    let runner = RealShell::new(ShellConfig {
        default_timeout: Some(Duration::from_millis(150)),
        ..ShellConfig::plain()
    });

    let started = Instant::now();
    let result = runner.pipe(&Command::new("sleep 30")).await;
    assert!(result.is_err_and(|err| err.is_timeout()));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn sync_timeout_kills_process() {
    init_tracing();

    let started = Instant::now();
    let result = shell().sync(&Command::new("sleep 30").with_timeout(Duration::from_millis(200)));

    assert!(matches!(result, Err(ShellError::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
}

/// The whole process group dies on timeout, not just the shell.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_grandchildren() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let pidfile = dir.path().join("child.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pidfile.display());

    let result = shell()
        .attach(
            &Command::new(script),
            Box::new(|_: &StreamChunk| {}),
            Duration::from_millis(300),
        )
        .await;
    assert!(matches!(result, Err(ShellError::TimedOut { .. })));

    let pid: u32 = std::fs::read_to_string(&pidfile)?.trim().parse()?;
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if !is_running(pid) {
            break;
        }
        assert!(Instant::now() < deadline, "grandchild {pid} still running");
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}

/// Gone entirely, or a zombie waiting for init to reap it.
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

#[tokio::test]
async fn shell_config_exports_environment() -> TestResult {
    init_tracing();

    let runner = RealShell::new(ShellConfig {
        path_prefix: vec!["/opt/phpmon/bin".to_string()],
        env: BTreeMap::from([("PHPMON_FLAVOUR".to_string(), "valet".to_string())]),
        ..ShellConfig::plain()
    });

    let output = runner
        .pipe(&Command::new("echo $PHPMON_FLAVOUR; echo \"$PATH\""))
        .await?;
    let mut lines = output.out.lines();

    assert_eq!(lines.next(), Some("valet"));
    let path = lines.next().ok_or("PATH line missing")?;
    assert!(path.starts_with("/opt/phpmon/bin:"), "PATH was {path}");
    Ok(())
}

/// Blocking calls on the blocking pool run side by side.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_calls_run_concurrently() -> TestResult {
    init_tracing();

    let runner: Arc<dyn ProcessRunner> = Arc::new(shell());
    let commands = vec![Command::new("sleep 0.7"); 3];

    let started = Instant::now();
    let results = sync_all(runner, commands).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    for result in results {
        assert!(result?.success());
    }
    assert!(elapsed < Duration::from_millis(2100), "took {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn pipe_all_keeps_input_order() -> TestResult {
    init_tracing();

    let runner: Arc<dyn ProcessRunner> = Arc::new(shell());
    let commands = vec![
        Command::new("sleep 0.3; echo slow"),
        Command::new("echo fast"),
        Command::new("exit 2"),
    ];

    let results = with_timeout(pipe_all(runner, commands)).await;
    let mut results = results.into_iter();

    assert_eq!(results.next().ok_or("missing")??.out, "slow\n");
    assert_eq!(results.next().ok_or("missing")??.out, "fast\n");
    assert_eq!(
        results.next().ok_or("missing")??.status,
        ExitStatus::Exited(2)
    );
    Ok(())
}

/// A daemon left running in the background keeps the pipes open; the call
/// still returns as soon as the shell itself exits.
#[tokio::test]
async fn backgrounded_descendant_does_not_delay_exit() -> TestResult {
    init_tracing();
    let command = Command::new("sleep 3 & echo hi");

    let started = Instant::now();
    let attached = shell()
        .attach(&command, Box::new(|_: &StreamChunk| {}), Duration::from_secs(2))
        .await?;
    assert!(started.elapsed() < Duration::from_millis(1500), "attach took {:?}", started.elapsed());
    assert_eq!(attached.out, "hi\n");
    assert!(attached.success());

    let started = Instant::now();
    let piped = shell().pipe(&command).await?;
    assert!(started.elapsed() < Duration::from_millis(1500), "pipe took {:?}", started.elapsed());
    assert_eq!(piped.out, "hi\n");
    Ok(())
}

#[test]
fn sync_returns_when_shell_exits_despite_background_child() -> TestResult {
    init_tracing();

    let started = Instant::now();
    let output = shell().sync(&Command::new("sleep 3 & echo hi").with_timeout(Duration::from_secs(2)))?;

    assert!(started.elapsed() < Duration::from_millis(1500), "sync took {:?}", started.elapsed());
    assert_eq!(output.out, "hi\n");
    assert!(output.success());
    Ok(())
}

/// After a timed-out attach returns, the handler is never called again.
#[tokio::test]
async fn no_chunks_delivered_after_timeout_returns() {
    init_tracing();

    let delivered = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&delivered);

    let started = Instant::now();
    let result = shell()
        .attach(
            &Command::new("while :; do echo x; done"),
            Box::new(move |_: &StreamChunk| *sink.lock().unwrap() += 1),
            Duration::from_millis(100),
        )
        .await;
    assert!(matches!(result, Err(ShellError::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));

    let at_return = *delivered.lock().unwrap();
    assert!(at_return > 0, "the writer should have produced output before the deadline");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*delivered.lock().unwrap(), at_return);
}
