// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker command lines and executable preflight.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use herald_core::HeraldError;

/// A worker invocation: program, fixed arguments and extra environment.
///
/// Every launch appends `<account_id> <ledger_path>` to the fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl WorkerCommand {
    /// Builds a command from a configured `[program, args...]` vector.
    pub fn from_parts(
        parts: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, HeraldError> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| HeraldError::Config("worker command must name a program".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            env: env.clone(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Builds the tokio command for one launch.
    pub(crate) fn build(&self, account_id: &str, ledger_path: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(account_id)
            .arg(ledger_path)
            .envs(&self.env);
        cmd
    }

    /// Verifies the program and its script argument are present on disk.
    ///
    /// The program is looked up on `PATH` unless it contains a path separator.
    /// The first non-flag argument that has a file extension (such as
    /// `index.js` in `node index.js`) must also exist.
    pub fn preflight(&self) -> Result<(), HeraldError> {
        if resolve_program(&self.program).is_none() {
            return Err(HeraldError::ExecutableMissing {
                path: PathBuf::from(&self.program),
            });
        }

        let script = self
            .args
            .iter()
            .find(|a| !a.starts_with('-'))
            .map(Path::new)
            .filter(|p| p.extension().is_some());
        match script {
            Some(script) if !script.is_file() => Err(HeraldError::ExecutableMissing {
                path: script.to_path_buf(),
            }),
            _ => Ok(()),
        }
    }
}

/// Resolves `program` to an existing file, searching `PATH` for bare names.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
