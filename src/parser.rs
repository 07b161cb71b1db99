use std::path::PathBuf;

use crate::ast::{CommandLine, Redirections, Stage};
use crate::tokenizer::Arg;
use crate::types::ShellError;

const REDIRECT_IN: &str = "<";
const REDIRECT_OUT: &str = ">";
const PIPE: &str = "|";

fn is_operator(arg: &Arg) -> bool {
    arg.is_literal(REDIRECT_IN) || arg.is_literal(REDIRECT_OUT) || arg.is_literal(PIPE)
}

fn find_operator(args: &[Arg], op: &str) -> Option<usize> {
    args.iter().position(|arg| arg.is_literal(op))
}

/// Classify an argument vector as a plain, redirected or piped command line.
///
/// Only the first occurrence of each operator is honoured; later ones are
/// handed to the program as ordinary arguments.
pub fn parse(args: &[Arg]) -> Result<CommandLine, ShellError> {
    let line = match find_operator(args, PIPE) {
        Some(pos) => parse_pipeline(&args[..pos], &args[pos + 1..])?,
        None => {
            let stage = parse_stage(args, true, true)?;
            if stage.redirects.is_empty() {
                CommandLine::Plain(stage)
            } else {
                CommandLine::Redirected(stage)
            }
        }
    };

    log::debug!("classified command line: {:?}", line);
    Ok(line)
}

fn parse_pipeline(left: &[Arg], right: &[Arg]) -> Result<CommandLine, ShellError> {
    if left.is_empty() {
        return Err(ShellError::malformed("missing command before `|`"));
    }
    if right.is_empty() {
        return Err(ShellError::malformed("missing command after `|`"));
    }
    Ok(CommandLine::Piped {
        left: parse_stage(left, true, false)?,
        right: parse_stage(right, false, true)?,
    })
}

fn parse_stage(args: &[Arg], allow_in: bool, allow_out: bool) -> Result<Stage, ShellError> {
    let mut redirects = Redirections::default();
    let mut skip = Vec::new();

    if let Some(pos) = find_operator(args, REDIRECT_IN) {
        if !allow_in {
            return Err(ShellError::malformed("input redirection after `|`"));
        }
        redirects.input = Some(redirect_target(args, pos)?);
        skip.extend([pos, pos + 1]);
    }
    if let Some(pos) = find_operator(args, REDIRECT_OUT) {
        if !allow_out {
            return Err(ShellError::malformed("output redirection before `|`"));
        }
        redirects.output = Some(redirect_target(args, pos)?);
        skip.extend([pos, pos + 1]);
    }

    let argv: Vec<String> = args
        .iter()
        .enumerate()
        .filter(|(i, _)| !skip.contains(i))
        .map(|(_, arg)| arg.value.clone())
        .collect();

    if argv.is_empty() {
        return Err(ShellError::malformed("missing command before redirection"));
    }
    Ok(Stage { argv, redirects })
}

fn redirect_target(args: &[Arg], pos: usize) -> Result<PathBuf, ShellError> {
    let op = &args[pos].value;
    match args.get(pos + 1) {
        None => Err(ShellError::malformed(format!("missing file name after `{}`", op))),
        Some(next) if is_operator(next) => Err(ShellError::malformed(format!(
            "expected file name after `{}`, found `{}`",
            op, next.value
        ))),
        Some(next) if next.value.is_empty() => {
            Err(ShellError::malformed(format!("empty file name after `{}`", op)))
        }
        Some(next) => Ok(PathBuf::from(&next.value)),
    }
}
