//! External process invocation.
//!
//! Backends describe the command they need as an [`Invocation`] and hand it
//! to a [`CommandRunner`]. [`SystemRunner`] spawns real processes;
//! [`ScriptedRunner`] replays canned outputs so nothing external is needed
//! in tests.

use edms_core::{ConverterError, EdmsResult};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

/// A command line to run: program, positional arguments, extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Space-joined rendering for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        ProcessOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        ProcessOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// First non-empty stderr line, trimmed.
    pub fn first_stderr_line(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Runs invocations to completion. Blocking, no timeout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> EdmsResult<ProcessOutput>;
}

// ============================================================================
// SYSTEM RUNNER
// ============================================================================

/// Spawns real processes with stdin closed and output captured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> EdmsResult<ProcessOutput> {
        debug!(command = %invocation.command_line(), "running external command");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ConverterError::Spawn {
                program: invocation.program.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ============================================================================
// SCRIPTED RUNNER
// ============================================================================

/// One canned response.
#[derive(Debug, Clone)]
struct Script {
    output: ProcessOutput,
    /// Bytes to write where the invocation expects its output file.
    creates: Option<Vec<u8>>,
}

/// Replays canned outputs in order and records every invocation.
///
/// With `creates`, the runner writes the bytes where the command would have
/// put its result: the `format:path` last argument of a magick convert,
/// `<outdir>/<stem>.pdf` for LibreOffice, or `--output=` for unoconv.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<VecDeque<Script>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push(&self, output: ProcessOutput) -> &Self {
        self.queue(Script {
            output,
            creates: None,
        })
    }

    /// Queue a successful response that also writes `contents` as the
    /// command's output file.
    pub fn push_creating(&self, contents: impl Into<Vec<u8>>) -> &Self {
        self.queue(Script {
            output: ProcessOutput::ok(""),
            creates: Some(contents.into()),
        })
    }

    fn queue(&self, script: Script) -> &Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
        self
    }

    /// Everything run so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|invocations| invocations.clone())
            .unwrap_or_default()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Where a command writes its result, judged from its arguments.
pub fn expected_output_path(invocation: &Invocation) -> Option<PathBuf> {
    let args = &invocation.args;
    if let Some(path) = args.iter().find_map(|a| a.strip_prefix("--output=")) {
        return Some(PathBuf::from(path));
    }
    if let Some(position) = args.iter().position(|a| a == "--outdir") {
        let outdir = args.get(position + 1)?;
        let input = args.get(position.checked_sub(1)?)?;
        let stem = Path::new(input).file_stem()?;
        let mut path = PathBuf::from(outdir).join(stem);
        path.set_extension("pdf");
        return Some(path);
    }
    let last = args.last()?;
    match last.split_once(':') {
        Some((format, path))
            if !format.is_empty() && format.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Some(PathBuf::from(path))
        }
        _ => Some(PathBuf::from(last)),
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> EdmsResult<ProcessOutput> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(invocation.clone());
        }

        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .ok_or_else(|| ConverterError::Spawn {
                program: invocation.program.display().to_string(),
                reason: "no scripted response left".to_string(),
            })?;

        if let Some(contents) = script.creates {
            let path = expected_output_path(invocation).ok_or_else(|| ConverterError::Spawn {
                program: invocation.program.display().to_string(),
                reason: "cannot tell where the output goes".to_string(),
            })?;
            fs::write(&path, contents).map_err(|e| ConverterError::Spawn {
                program: invocation.program.display().to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;
        }
        Ok(script.output)
    }
}
