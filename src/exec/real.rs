// src/exec/real.rs

//! Runner that spawns real OS processes through the configured shell.

use std::io::Read;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ShellError;

use super::runner::{BoxFuture, ChunkHandler, ProcessRunner, ShellResult};
use super::shell_command::ShellConfig;
use super::types::{Command, ExitStatus, ShellOutput, Stream, StreamChunk};

/// How often the blocking path checks whether a timed process has exited.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Channel capacity between the stream listeners and the aggregator.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// How long output is still collected after the process has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Spawns `program -l -c <command>` for every call.
///
/// Each process is started in its own process group so a timeout can kill
/// the command together with everything it forked.
#[derive(Debug, Clone, Default)]
pub struct RealShell {
    config: ShellConfig,
}

impl RealShell {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    fn effective_timeout(&self, command: &Command) -> Option<Duration> {
        command.timeout().or(self.config.default_timeout)
    }

    /// Spawn the process, fan both pipes into one aggregator and race the
    /// result against `timeout`.
    async fn run_streaming(
        &self,
        command: &Command,
        mut on_chunk: ChunkHandler<'_>,
        timeout: Option<Duration>,
    ) -> ShellResult {
        let mut cmd = self.config.tokio_command(command.text());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ShellError::LaunchFailed {
            command: command.text().to_string(),
            source,
        })?;

        debug!(
            cmd = %command,
            pid = ?child.id(),
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "spawned shell process"
        );

        let (tx, mut rx) = mpsc::channel::<StreamChunk>(CHUNK_CHANNEL_CAPACITY);
        let mut listeners = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            listeners.push(spawn_listener(Stream::Stdout, stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            listeners.push(spawn_listener(Stream::Stderr, stderr, tx.clone()));
        }
        // The channel closes once both listeners have hit EOF.
        drop(tx);

        let mut output = ShellOutput::empty();
        let expiry = expire_after(timeout);
        tokio::pin!(expiry);

        // Race exit against the deadline while forwarding chunks. EOF on the
        // pipes is not exit: a backgrounded daemon may keep them open.
        let finished = loop {
            tokio::select! {
                Some(chunk) = rx.recv() => {
                    on_chunk(&chunk);
                    output.append(&chunk);
                }
                status = child.wait() => break Some(status),
                _ = &mut expiry => break None,
            }
        };

        match finished {
            Some(status) => {
                let status = status.map_err(|source| ShellError::Io {
                    command: command.text().to_string(),
                    source,
                })?;

                let drained = drain_after_exit(&mut rx, &mut output, &mut on_chunk).await;
                if !drained {
                    debug!(
                        cmd = %command,
                        "output pipes still open after exit; a descendant holds them"
                    );
                }
                stop_listeners(listeners).await;

                output.status = ExitStatus::from(status);
                debug!(cmd = %command, status = %output.status, "shell process exited");
                Ok(output)
            }
            None => {
                let timeout = timeout.unwrap_or_default();
                warn!(
                    cmd = %command,
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out; killing process group"
                );

                kill_process_tree(&mut child).await;
                stop_listeners(listeners).await;

                Err(ShellError::TimedOut {
                    command: command.text().to_string(),
                    timeout,
                })
            }
        }
    }
}

impl ProcessRunner for RealShell {
    fn sync(&self, command: &Command) -> ShellResult {
        let mut cmd = self.config.std_command(command.text());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ShellError::LaunchFailed {
            command: command.text().to_string(),
            source,
        })?;

        let timeout = self.effective_timeout(command);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_buf = PipeBuffer::default();
        let err_buf = PipeBuffer::default();
        let readers = [
            spawn_reader(stdout, Arc::clone(&out_buf)),
            spawn_reader(stderr, Arc::clone(&err_buf)),
        ];

        let waited = wait_blocking(&mut child, timeout);

        // Readers are detached: a backgrounded descendant may hold the pipes
        // open long after the shell itself has exited.
        if !readers_finish_within(&readers, EXIT_DRAIN_GRACE) {
            debug!(
                cmd = %command,
                "output pipes still open after exit; a descendant holds them"
            );
        }
        let out = take_lossy(&out_buf);
        let err = take_lossy(&err_buf);

        let io_error = |source| ShellError::Io {
            command: command.text().to_string(),
            source,
        };

        match waited.map_err(io_error)? {
            Some(status) => Ok(ShellOutput {
                out,
                err,
                status: ExitStatus::from(status),
            }),
            None => Err(ShellError::TimedOut {
                command: command.text().to_string(),
                timeout: timeout.unwrap_or_default(),
            }),
        }
    }

    fn pipe<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, ShellResult> {
        let timeout = self.effective_timeout(command);
        Box::pin(self.run_streaming(command, Box::new(|_: &StreamChunk| {}), timeout))
    }

    fn attach<'a>(
        &'a self,
        command: &'a Command,
        on_chunk: ChunkHandler<'a>,
        timeout: Duration,
    ) -> BoxFuture<'a, ShellResult> {
        info!(cmd = %command, "attaching to shell command");
        Box::pin(self.run_streaming(command, on_chunk, Some(timeout)))
    }
}

/// Read one pipe line by line, forwarding each line (newline included) as
/// a chunk. Per-stream order is the channel order.
fn spawn_listener<R>(stream: Stream, reader: R, tx: mpsc::Sender<StreamChunk>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(StreamChunk { stream, text }).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(?stream, error = %err, "error reading process output");
                    break;
                }
            }
        }
    })
}

/// Deliver whatever the listeners still have after the process exited.
///
/// Returns `false` if the pipes were still open when the grace period ran
/// out. This is the only writer to `output` besides the main loop.
async fn drain_after_exit(
    rx: &mut mpsc::Receiver<StreamChunk>,
    output: &mut ShellOutput,
    on_chunk: &mut ChunkHandler<'_>,
) -> bool {
    let drain = async {
        while let Some(chunk) = rx.recv().await {
            on_chunk(&chunk);
            output.append(&chunk);
        }
    };
    tokio::time::timeout(EXIT_DRAIN_GRACE, drain).await.is_ok()
}

/// Abort both listeners and wait for them, so no chunk outlives the call.
async fn stop_listeners(listeners: Vec<JoinHandle<()>>) {
    for listener in &listeners {
        listener.abort();
    }
    for listener in listeners {
        let _ = listener.await;
    }
}

async fn expire_after(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// SIGKILL the whole process group, then kill and reap the direct child.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            #[allow(clippy::cast_possible_wrap)]
            let group = Pid::from_raw(pid as i32);
            if let Err(err) = killpg(group, Signal::SIGKILL) {
                debug!(pid, error = %err, "killpg failed; process group may already be gone");
            }
        }
    }

    if let Err(err) = child.kill().await {
        debug!(error = %err, "failed to kill child process");
    }
}

fn wait_blocking(
    child: &mut std::process::Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(SYNC_POLL_INTERVAL);
    }

    warn!(
        pid = child.id(),
        timeout_ms = timeout.as_millis() as u64,
        "blocking command timed out; killing process group"
    );

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    }

    let _ = child.kill();
    child.wait()?;
    Ok(None)
}

type PipeBuffer = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R>(reader: Option<R>, sink: PipeBuffer) -> Option<std::thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let mut reader = reader?;
    Some(std::thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(error = %err, "error draining process output");
                    break;
                }
            }
        }
    }))
}

/// Poll until every reader has hit EOF or `grace` has elapsed.
fn readers_finish_within(readers: &[Option<std::thread::JoinHandle<()>>], grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        let done = readers
            .iter()
            .flatten()
            .all(|reader| reader.is_finished());
        if done {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(SYNC_POLL_INTERVAL);
    }
}

fn take_lossy(buf: &PipeBuffer) -> String {
    let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).into_owned()
}
