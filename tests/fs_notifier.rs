// tests/fs_notifier.rs

use std::error::Error;
use std::path::Path;
use std::time::{Duration, Instant};

use phpmon_runtime::errors::PhpmonError;
use phpmon_runtime::watch::{EventMask, FsNotifier};
use phpmon_test_utils::fakes::CallCounter;
use phpmon_test_utils::init_tracing;
use tokio::time::sleep;

type TestResult = Result<(), Box<dyn Error>>;

const WINDOW: Duration = Duration::from_millis(200);
const SETTLE: Duration = Duration::from_millis(800);

fn touch(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Poll until `counter` reaches `expected` or two seconds pass.
async fn wait_for(counter: &CallCounter, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if counter.count() >= expected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undebounced_write_fires_callback() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "memory_limit=128M\n")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file).start(counter.callback())?;

    touch(&file, "memory_limit=512M\n")?;
    assert!(wait_for(&counter, 1).await, "write was not reported");

    notifier.terminate();
    Ok(())
}

/// Two writes inside one window produce exactly one callback.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_within_window_collapse_to_one() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "a\n")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(WINDOW)
        .start(counter.callback())?;

    touch(&file, "b\n")?;
    sleep(Duration::from_millis(50)).await;
    touch(&file, "c\n")?;

    sleep(SETTLE).await;
    assert_eq!(counter.count(), 1);

    drop(notifier);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn suspended_events_are_dropped_not_replayed() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("valet.json");
    touch(&file, "{}")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(WINDOW)
        .start(counter.callback())?;

    notifier.suspend();
    assert!(notifier.is_suspended());
    touch(&file, "{\"tld\":\"test\"}")?;
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0, "suspended write must not be reported");

    notifier.resume();
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0, "resume must not replay dropped events");

    touch(&file, "{\"tld\":\"localhost\"}")?;
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 1);
    Ok(())
}

/// A timer armed just before `suspend` does not fire while suspended.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_debounce_is_dropped_when_suspended() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("valet.json");
    touch(&file, "{}")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(Duration::from_millis(400))
        .start(counter.callback())?;

    touch(&file, "{\"a\":1}")?;
    sleep(Duration::from_millis(100)).await;
    notifier
        .with_suspended(|| async { sleep(Duration::from_millis(700)).await })
        .await;

    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0);
    assert!(!notifier.is_suspended());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn with_suspended_resumes_after_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(WINDOW)
        .start(counter.callback())?;

    let result: Result<(), std::io::Error> = notifier
        .with_suspended(|| async {
            touch(&file, "written by us\n")?;
            // Let the watcher thread see our own write while still suspended.
            sleep(Duration::from_millis(300)).await;
            Err(std::io::Error::other("config write failed"))
        })
        .await;
    assert!(result.is_err());
    assert!(!notifier.is_suspended());

    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0, "own write must not be reported");

    touch(&file, "written by someone else\n")?;
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn with_suspended_blocking_resumes_after_panic() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "")?;

    let notifier = FsNotifier::builder(&file).start(|| {})?;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        notifier.with_suspended_blocking(|| panic!("writer crashed"))
    }));
    assert!(outcome.is_err());
    assert!(!notifier.is_suspended());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_stops_callbacks_and_is_idempotent() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(WINDOW)
        .start(counter.callback())?;

    // Armed but not yet fired: terminate cancels it.
    touch(&file, "x\n")?;
    sleep(Duration::from_millis(50)).await;
    notifier.terminate();
    assert!(notifier.is_terminated());
    notifier.terminate();

    touch(&file, "y\n")?;
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0);
    Ok(())
}

/// Only event classes in the mask reach the callback.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mask_filters_event_classes() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(dir.path())
        .mask(EventMask::DELETE)
        .debounce(WINDOW)
        .start(counter.callback())?;
    assert_eq!(notifier.mask(), EventMask::DELETE);

    let file = dir.path().join("site.conf");
    touch(&file, "server {}\n")?;
    sleep(SETTLE).await;
    assert_eq!(counter.count(), 0, "create/write is outside the mask");

    std::fs::remove_file(&file)?;
    assert!(wait_for(&counter, 1).await, "delete was not reported");
    Ok(())
}

#[tokio::test]
async fn missing_path_fails_to_start() {
    init_tracing();
    let result = FsNotifier::builder("/definitely/not/here/php.ini").start(|| {});
    assert!(matches!(result, Err(PhpmonError::Watch(_))));
}

#[test]
fn debounce_without_runtime_is_an_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let result = FsNotifier::builder(dir.path())
        .debounce(WINDOW)
        .start(|| {});
    assert!(matches!(result, Err(PhpmonError::NoRuntime(_))));
    Ok(())
}

/// An explicit runtime handle lets a notifier live outside async code.
#[test]
fn explicit_runtime_handle_drives_debounce() -> TestResult {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("php.ini");
    touch(&file, "")?;

    let counter = CallCounter::new();
    let notifier = FsNotifier::builder(&file)
        .debounce(WINDOW)
        .runtime(runtime.handle().clone())
        .start(counter.callback())?;

    touch(&file, "opcache.enable=1\n")?;
    std::thread::sleep(SETTLE);
    assert_eq!(counter.count(), 1);

    drop(notifier);
    Ok(())
}
