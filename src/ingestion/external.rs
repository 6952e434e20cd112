//! Legacy workbook conversion through an external office suite running headless.
//!
//! Each call gets a private scratch directory holding the input copy, the converted CSV, the
//! tool's stderr and its user profile. The directory is removed when the call returns, on
//! success, on conversion failure and on timeout alike.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::error::{StagingError, StagingResult};

use super::unified::SheetConverter;

/// CSV export filter: comma separated, double-quote text delimiter, UTF-8, first sheet.
const CSV_EXPORT_FILTER: &str = "csv:Text - txt - csv (StarCalc):44,34,76,1";
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_FILE: &str = "convert.stderr";

/// Runs `<program> <args..> -env:UserInstallation=.. --headless --convert-to csv --outdir <dir> <input>`.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
            scratch_root: None,
        }
    }

    /// Arguments placed before the conversion arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the tool and fail if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch_dir(&self) -> StagingResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn spawn(&self, scratch: &Path, input_path: &Path) -> StagingResult<Child> {
        let stderr = File::create(scratch.join(STDERR_FILE))?;
        let profile = format!("-env:UserInstallation=file://{}", scratch.join("profile").display());

        Command::new(&self.program)
            .args(&self.args)
            .arg(profile)
            .args(["--headless", "--convert-to", CSV_EXPORT_FILTER, "--outdir"])
            .arg(scratch)
            .arg(input_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| StagingError::Conversion {
                message: format!("could not start '{}': {e}", self.program.display()),
            })
    }
}

impl SheetConverter for ExternalConverter {
    fn convert(&self, input: &[u8], file_name: &str) -> StagingResult<Vec<u8>> {
        // Only the final path component is used; uploads cannot pick where they land.
        let base_name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| StagingError::UnsupportedExtension {
                file_name: file_name.to_string(),
            })?;

        let scratch = self.scratch_dir()?;
        let input_path = scratch.path().join(base_name);
        fs::write(&input_path, input)?;

        let started = Instant::now();
        let mut child = self.spawn(scratch.path(), &input_path)?;
        let status = wait_with_deadline(&mut child, self.timeout)?;
        tracing::debug!(
            program = %self.program.display(),
            %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "external conversion finished"
        );

        if !status.success() {
            let stderr = fs::read_to_string(scratch.path().join(STDERR_FILE)).unwrap_or_default();
            return Err(StagingError::Conversion {
                message: format!(
                    "'{}' exited with {status}: {}",
                    self.program.display(),
                    stderr.trim()
                ),
            });
        }

        let output_path = input_path.with_extension("csv");
        match fs::read(&output_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StagingError::Conversion {
                message: format!("'{}' produced no CSV output", self.program.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> StagingResult<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StagingError::ConversionTimeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}
