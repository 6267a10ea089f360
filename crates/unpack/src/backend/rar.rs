//! RAR backend driving an external unrar/rar process.
//!
//! There is no native reader here: RAR support exists only when a tool is
//! installed. Solid RAR archives make per-member extraction expensive, so
//! the whole worklist goes through one bulk pass.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::backend::{entry_error, Backend};
use crate::error::UnpackError;
use crate::tools::{self, ToolFamily};

pub(crate) struct RarBackend {
    src: PathBuf,
    tool: PathBuf,
}

impl RarBackend {
    pub(crate) fn open(path: &Path) -> Result<Self, UnpackError> {
        let tool = tools::rar_tool().ok_or(UnpackError::ToolMissing {
            family: ToolFamily::Rar,
        })?;
        Ok(Self {
            src: path.to_path_buf(),
            tool: tool.to_path_buf(),
        })
    }

    /// Run `x` with the password-less, keep-broken, no-overwrite flags.
    /// The tool resolves member paths against its working directory, so
    /// extraction runs with cwd set to the destination.
    fn run_extract(&self, dst: &Path, name: Option<&str>) -> Result<(), UnpackError> {
        let mut command = Command::new(&self.tool);
        command.args(["x", "-kb", "-p-", "-o-", "-inul", "--"]);
        command.arg(&self.src);
        if let Some(name) = name {
            command.arg(name);
        }
        let status = command
            .current_dir(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("rar tool exit status {status}"),
            )
            .into());
        }
        Ok(())
    }
}

impl Backend for RarBackend {
    fn list(&mut self) -> Result<Vec<String>, UnpackError> {
        // "vb" prints one bare member path per line
        let output = Command::new(&self.tool)
            .args(["vb", "-p-", "--"])
            .arg(&self.src)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(UnpackError::Open {
                path: self.src.clone(),
                reason: format!(
                    "rar tool listing failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn extract_entry(&mut self, name: &str, dst: &Path) -> Result<(), UnpackError> {
        self.run_extract(dst, Some(name))
    }

    fn prefers_bulk(&self) -> bool {
        true
    }

    fn extract_bulk(&mut self, dst: &Path) -> Result<(), UnpackError> {
        debug!(archive = %self.src.display(), "bulk RAR extraction");
        self.run_extract(dst, None)
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, UnpackError> {
        // "p" prints the member's bytes to stdout
        let output = Command::new(&self.tool)
            .args(["p", "-inul", "-p-", "--"])
            .arg(&self.src)
            .arg(name)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(entry_error(
                name,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(output.stdout)
    }
}
