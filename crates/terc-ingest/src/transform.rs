//! Derived-layer transformation
//!
//! Bronze, silver and gold are built by an external dbt project that reads the
//! raw partitions. This stage only runs the command and reports whether it
//! succeeded.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestError, Result};

pub const DEFAULT_PROGRAM: &str = "dbt";

/// Lines of command output kept in an error message
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransformCommand {
    Build,
    Run,
    Test,
}

impl TransformCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformCommand::Build => "build",
            TransformCommand::Run => "run",
            TransformCommand::Test => "test",
        }
    }
}

impl fmt::Display for TransformCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TransformStage {
    program: String,
    project_dir: PathBuf,
    profiles_dir: PathBuf,
}

impl TransformStage {
    pub fn new(
        program: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        profiles_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            project_dir: project_dir.into(),
            profiles_dir: profiles_dir.into(),
        }
    }

    /// Arguments passed to the program for `command`
    pub fn args(&self, command: TransformCommand) -> Vec<OsString> {
        vec![
            command.as_str().into(),
            "--project-dir".into(),
            self.project_dir.clone().into_os_string(),
            "--profiles-dir".into(),
            self.profiles_dir.clone().into_os_string(),
        ]
    }

    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn invoke(&self, command: TransformCommand) -> Result<()> {
        info!("Running {} {}", self.program, command);

        let output = tokio::process::Command::new(&self.program)
            .args(self.args(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                IngestError::Transform(format!("failed to start {}: {}", self.program, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(target: "terc_ingest::transform::output", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} {} exited with {}", self.program, command, output.status);
            return Err(IngestError::Transform(format!(
                "{} {} exited with {}\n{}{}",
                self.program,
                command,
                output.status,
                tail(&stdout, OUTPUT_TAIL_LINES),
                tail(&stderr, OUTPUT_TAIL_LINES)
            )));
        }

        info!("{} {} finished", self.program, command);
        Ok(())
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..]
        .iter()
        .map(|l| format!("{}\n", l))
        .collect()
}
