// Provisioning CLI invocation settings shared by the adapters

/// Default provisioning CLI
pub const DEFAULT_PROGRAM: &str = "aws";

/// Program plus arguments placed before every subcommand
/// (e.g. `--endpoint-url http://localhost:4566` or `--no-cli-pager`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliProgram {
    pub program: String,
    pub global_args: Vec<String>,
}

impl Default for CliProgram {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CliProgram {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    pub fn with_global_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Command with the global args already applied
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.global_args);
        cmd
    }
}
