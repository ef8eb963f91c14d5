use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::{Result, UtilError};

/// Stdio mode for subprocess streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Inherit the parent process's stream.
    Inherit,
    /// Pipe the stream (capture it).
    Pipe,
    /// Redirect to /dev/null.
    Null,
}

impl StdioMode {
    fn to_stdio(self) -> Stdio {
        match self {
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::Pipe => Stdio::piped(),
            StdioMode::Null => Stdio::null(),
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for the collaborator subprocesses (git, ssh, the server tunnel).
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    env_vars: Vec<(OsString, OsString)>,
    stdin_mode: StdioMode,
    stdout_mode: StdioMode,
    stderr_mode: StdioMode,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            env_vars: Vec::new(),
            stdin_mode: StdioMode::Inherit,
            stdout_mode: StdioMode::Inherit,
            stderr_mode: StdioMode::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        for arg in args {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> Self {
        self.env_vars
            .push((key.as_ref().to_os_string(), val.as_ref().to_os_string()));
        self
    }

    pub fn stdin(mut self, mode: StdioMode) -> Self {
        self.stdin_mode = mode;
        self
    }

    pub fn stdout(mut self, mode: StdioMode) -> Self {
        self.stdout_mode = mode;
        self
    }

    pub fn stderr(mut self, mode: StdioMode) -> Self {
        self.stderr_mode = mode;
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }
        cmd.stdin(self.stdin_mode.to_stdio());
        cmd.stdout(self.stdout_mode.to_stdio());
        cmd.stderr(self.stderr_mode.to_stdio());
        cmd
    }

    /// Command line as a display string for error messages.
    pub fn command_string(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            s.push(' ');
            s.push_str(&arg.to_string_lossy());
        }
        s
    }

    /// Run to completion, capturing whatever was piped.
    pub fn run(&self) -> Result<CmdOutput> {
        let mut cmd = self.build_command();
        let cmd_str = self.command_string();
        let child = cmd.spawn().map_err(|e| UtilError::Subprocess {
            command: cmd_str.clone(),
            source: e,
        })?;
        let output = child
            .wait_with_output()
            .map_err(|e| UtilError::Subprocess {
                command: cmd_str,
                source: e,
            })?;
        Ok(CmdOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run to completion and fail unless the exit status is zero.
    pub fn run_ok(&self) -> Result<CmdOutput> {
        let out = self.run()?;
        if !out.success() {
            return Err(UtilError::ExitStatus {
                command: self.command_string(),
                code: out.status.code().unwrap_or(-1),
            });
        }
        Ok(out)
    }

    /// Spawn without waiting.
    pub fn spawn(&self) -> Result<Child> {
        let mut cmd = self.build_command();
        let cmd_str = self.command_string();
        cmd.spawn().map_err(|e| UtilError::Subprocess {
            command: cmd_str,
            source: e,
        })
    }
}
