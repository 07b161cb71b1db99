use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Redirections {
    pub input: Option<PathBuf>,  // <
    pub output: Option<PathBuf>, // >
}

impl Redirections {
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none()
    }
}

/// A single program invocation with operator tokens already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub redirects: Redirections,
}

impl Stage {
    pub fn program(&self) -> &str {
        // argv is never empty once the analyzer has accepted the stage
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandLine {
    Plain(Stage),
    Redirected(Stage),
    Piped { left: Stage, right: Stage },
}
