use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("system error ({context}): {errno}")]
    Nix { context: String, errno: Errno },
    #[error("failed to launch {program}: {errno}")]
    LaunchFailure { program: String, errno: Errno },
    #[error("malformed command line: {0}")]
    MalformedOperatorUsage(String),
    #[error("input limit exceeded: {0}")]
    InputLimit(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Builtin(String),
}

impl ShellError {
    pub fn nix(context: impl Into<String>, errno: Errno) -> Self {
        ShellError::Nix {
            context: context.into(),
            errno,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        ShellError::MalformedOperatorUsage(msg.into())
    }
}

/// Exit status reported for a child that could not exec its program.
pub const EXIT_EXEC_FAILURE: i32 = 127;
/// Exit status reported for a child whose redirection target could not be opened.
pub const EXIT_REDIRECT_FAILURE: i32 = 1;
