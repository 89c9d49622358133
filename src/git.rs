use crate::errors::CloneFailed;
use crate::progress::{ProgressParser, ProgressSink};
use crate::repository::WorkItem;
use colored::Colorize;
use failure::{Error, ResultExt};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Something which can clone a [`WorkItem`], resolving to the URL it cloned.
pub trait Cloner: Send + Sync {
    fn clone_repo(&self, item: &WorkItem) -> impl Future<Output = Result<String, Error>> + Send;
}

/// Clones repositories by running `git clone --progress`, rendering its
/// progress to a shared [`ProgressSink`].
///
/// There is no timeout, a clone which hangs will hang forever.
#[derive(Clone)]
pub struct GitClone {
    program: String,
    sink: Arc<dyn ProgressSink>,
    verbose: bool,
}

impl GitClone {
    pub fn new(sink: Arc<dyn ProgressSink>) -> GitClone {
        GitClone {
            program: String::from("git"),
            sink,
            verbose: false,
        }
    }

    /// Announce each clone as it starts and finishes.
    pub fn verbose(mut self, verbose: bool) -> GitClone {
        self.verbose = verbose;
        self
    }

    /// Use something other than `git` from `$PATH`.
    pub fn program<S: Into<String>>(mut self, program: S) -> GitClone {
        self.program = program.into();
        self
    }

    pub async fn run_clone(&self, source: &str, dest_dir: &Path) -> Result<String, Error> {
        debug!("Cloning {} into {}", source, dest_dir.display());

        if self.verbose {
            self.sink
                .message(&format!("git clone {} ...", source.bright_green()).cyan().to_string());
        }

        let mut child = Command::new(&self.program)
            .arg("clone")
            .arg(source)
            .arg(dest_dir)
            .arg("--progress")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|_| format!("Unable to invoke {}", self.program))?;

        let mut monitor = CloneMonitor::new(&*self.sink, dest_dir.display().to_string());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (_, stdout) = tokio::try_join!(monitor.watch(stderr), read_all(stdout))?;

        let status = child.wait().await.context("Unable to wait for git")?;
        trace!("({}) Exit Status: {}", source, status);
        if !stdout.is_empty() {
            trace!("({}) Stdout: {:?}", source, stdout);
        }

        let outcome = monitor.finish(source, status.code());

        if self.verbose {
            self.report(source, dest_dir, &outcome);
        }

        outcome
    }

    fn report(&self, source: &str, dest_dir: &Path, outcome: &Result<String, Error>) {
        let msg = format!(
            "clone {} to {} directory",
            source.bright_green(),
            dest_dir.display().to_string().bright_cyan()
        );

        self.sink.finish_line();
        self.sink.message(&msg);

        if let Err(e) = outcome {
            if let Some(failed) = e.downcast_ref::<CloneFailed>() {
                self.sink.message(&failed.stderr.bright_red().to_string());
            }
        }
    }
}

impl Cloner for GitClone {
    async fn clone_repo(&self, item: &WorkItem) -> Result<String, Error> {
        self.run_clone(&item.clone_url, &item.dest_dir).await
    }
}

/// Watches the output of one running `git clone`.
///
/// Creating a monitor means the process is running, and `finish()` consumes
/// it once the process exits, so no output can be observed afterwards.
pub(crate) struct CloneMonitor<'a> {
    sink: &'a dyn ProgressSink,
    label: String,
    parser: ProgressParser,
    stderr: Vec<u8>,
}

impl<'a> CloneMonitor<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, label: String) -> CloneMonitor<'a> {
        CloneMonitor {
            sink,
            label,
            parser: ProgressParser::new(),
            stderr: Vec::new(),
        }
    }

    /// Feed everything from the process's stderr through the monitor.
    async fn watch<R: AsyncRead + Unpin>(&mut self, stream: Option<R>) -> Result<(), Error> {
        let mut stream = match stream {
            Some(s) => s,
            None => return Ok(()),
        };
        let mut buffer = [0; 4096];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .context("Unable to read git's output")?;

            if bytes_read == 0 {
                return Ok(());
            }

            self.observe(&buffer[..bytes_read]);
        }
    }

    /// Classify a chunk of output, updating the status line if it contained
    /// any progress.
    pub(crate) fn observe(&mut self, chunk: &[u8]) {
        self.stderr.extend_from_slice(chunk);

        let events = self.parser.feed(&String::from_utf8_lossy(chunk));
        if events.is_empty() {
            return;
        }

        let line = format!(
            "{}: {}",
            self.label.bright_cyan(),
            self.parser.state().to_string().bright_magenta()
        );
        self.sink.replace_line(&line);

        if events.iter().any(|e| e.done) {
            self.sink.finish_line();
        }
    }

    /// The process exited, only its exit code decides how it went.
    pub(crate) fn finish(self, source: &str, code: Option<i32>) -> Result<String, Error> {
        let state = self.parser.finish();
        trace!("({}) Final progress: {}", source, state);

        if code == Some(0) {
            Ok(source.to_string())
        } else {
            Err(CloneFailed {
                url: source.to_string(),
                code,
                stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
            }
            .into())
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> Result<String, Error> {
    let mut buffer = Vec::new();

    if let Some(mut stream) = stream {
        stream
            .read_to_end(&mut buffer)
            .await
            .context("Unable to read git's output")?;
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
