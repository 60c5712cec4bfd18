//! External tool invocation.
//!
//! Every subprocess (ffmpeg, ffprobe, tesseract) is started through an
//! [`Invocation`]: an explicit argument list, never a shell string, with
//! stdout and stderr captured. A non-zero exit is a hard failure for that
//! call and surfaces as [`ExtractError::ToolExecution`].
//!
//! [`ScratchFile`] is the scoped owner of a tool's output file. It is deleted
//! when dropped, whichever way the calling stage exits.

use crate::error::{ExtractError, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempPath;
use tracing::debug;

/// Longest stderr excerpt carried inside an error.
const STDERR_TAIL: usize = 600;

/// Captured output of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// A program plus its argument list.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Short name used in logs and errors (`ffmpeg`, not `/usr/bin/ffmpeg`).
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// The argument list as UTF-8 (lossy), mostly for tests and logging.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn execute(&self) -> Result<std::process::Output> {
        debug!(tool = %self.tool_name(), args = ?self.args_lossy(), "running tool");
        Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| ExtractError::ToolSpawn {
                tool: self.tool_name(),
                source,
            })
    }

    /// Run and capture output without judging the exit status.
    pub fn run_unchecked(&self) -> Result<ToolOutput> {
        let output = self.execute()?;
        if !output.status.success() {
            debug!(tool = %self.tool_name(), status = %output.status, "tool exited non-zero");
        }
        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    /// Run and fail on a non-zero exit status.
    pub fn run(&self) -> Result<ToolOutput> {
        let output = self.execute()?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ExtractError::ToolExecution {
                tool: self.tool_name(),
                status: output.status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL).to_string(),
            });
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            success: true,
        })
    }
}

/// The last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    let s = s.trim_end();
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

// ── Scratch files ────────────────────────────────────────────────────────

/// A uniquely named temp path deleted on drop.
///
/// The file is created empty so the name is reserved; tools invoked with
/// `-y` overwrite it.
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn new(suffix: &str) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("edgequake-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| ExtractError::io(std::env::temp_dir(), e))?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file's current contents.
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| ExtractError::io(self.path(), e))
    }
}
