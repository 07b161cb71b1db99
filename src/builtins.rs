use std::env;
use std::io::Write;
use std::path::PathBuf;

use crate::types::ShellError;

pub const BUILTINS: [&str; 6] = ["cd", "pwd", "exit", "env", "setenv", "echo"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuiltinStatus {
    Continue(i32),
    Exit,
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run the built-in named by `argv[0]` in the shell process itself.
/// Output goes to `out` so callers can capture it.
pub fn execute_builtin(argv: &[String], out: &mut dyn Write) -> Result<BuiltinStatus, ShellError> {
    let (name, args) = match argv.split_first() {
        Some((name, args)) => (name.as_str(), args),
        None => return Ok(BuiltinStatus::Continue(0)),
    };

    match name {
        "exit" => Ok(BuiltinStatus::Exit),
        "echo" => {
            writeln!(out, "{}", args.join(" "))?;
            Ok(BuiltinStatus::Continue(0))
        }
        "pwd" => {
            let cwd = env::current_dir()?;
            writeln!(out, "{}", cwd.display())?;
            Ok(BuiltinStatus::Continue(0))
        }
        "cd" => {
            let path = match args.first() {
                Some(path) => PathBuf::from(path),
                None => env::var_os("HOME")
                    .map(PathBuf::from)
                    .ok_or_else(|| ShellError::Builtin("cd: HOME not set".to_string()))?,
            };
            let prev = env::current_dir()?;
            env::set_current_dir(&path)
                .map_err(|e| ShellError::Builtin(format!("cd: {}: {}", path.display(), e)))?;
            env::set_var("OLDPWD", prev);
            Ok(BuiltinStatus::Continue(0))
        }
        "env" => {
            match args.first() {
                Some(var) => match env::var_os(var) {
                    Some(value) => writeln!(out, "{}", value.to_string_lossy())?,
                    None => return Ok(BuiltinStatus::Continue(1)),
                },
                None => {
                    for (key, value) in env::vars_os() {
                        writeln!(out, "{}={}", key.to_string_lossy(), value.to_string_lossy())?;
                    }
                }
            }
            Ok(BuiltinStatus::Continue(0))
        }
        "setenv" => match args {
            [var, value, ..] => {
                let bad_name = var.is_empty() || var.contains('=') || var.contains('\0');
                if bad_name || value.contains('\0') {
                    return Err(ShellError::Builtin(format!(
                        "setenv: invalid variable name: {}",
                        var
                    )));
                }
                env::set_var(var, value);
                Ok(BuiltinStatus::Continue(0))
            }
            _ => {
                writeln!(out, "Usage: setenv VARIABLE VALUE")?;
                Ok(BuiltinStatus::Continue(1))
            }
        },
        _ => Err(ShellError::Builtin(format!("Unknown builtin: {}", name))),
    }
}
