use crate::config::Limits;
use crate::types::ShellError;

const DELIMITERS: &[char] = &[' ', '\t', '\r', '\n'];
const VAR_MARKER: char = '$';
const BACKGROUND_MARKER: &str = "&";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Literal(&'a str),
    EnvRef(&'a str), // name without the leading '$'
}

/// One resolved entry of the argument vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: String,
    /// Set when the value came from variable substitution. Expanded values
    /// are never treated as operators or as the background marker.
    pub expanded: bool,
}

impl Arg {
    pub fn literal(value: impl Into<String>) -> Self {
        Arg {
            value: value.into(),
            expanded: false,
        }
    }

    pub fn is_literal(&self, text: &str) -> bool {
        !self.expanded && self.value == text
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenizedLine {
    pub args: Vec<Arg>,
    pub background: bool,
}

impl TokenizedLine {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

pub fn lex(input: &str) -> Vec<Token<'_>> {
    input
        .split(DELIMITERS)
        .filter(|s| !s.is_empty())
        .map(|word| match word.strip_prefix(VAR_MARKER) {
            Some(name) if !name.is_empty() => Token::EnvRef(name),
            _ => Token::Literal(word),
        })
        .collect()
}

/// Split `input` into an argument vector, substituting `$NAME` references
/// from the process environment and stripping a trailing `&`.
///
/// A reference to an unset variable drops the token entirely; a variable set
/// to the empty string yields an empty argument.
pub fn tokenize(input: &str, limits: &Limits) -> Result<TokenizedLine, ShellError> {
    if input.len() > limits.max_line_len {
        return Err(ShellError::InputLimit(format!(
            "line is {} bytes, limit is {}",
            input.len(),
            limits.max_line_len
        )));
    }

    let tokens = lex(input);
    if tokens.len() > limits.max_tokens {
        return Err(ShellError::InputLimit(format!(
            "line has {} tokens, limit is {}",
            tokens.len(),
            limits.max_tokens
        )));
    }

    let mut args = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Literal(text) => args.push(Arg::literal(text)),
            Token::EnvRef(name) => match std::env::var(name) {
                Ok(value) => args.push(Arg {
                    value,
                    expanded: true,
                }),
                Err(_) => log::debug!("${} is unset, dropping token", name),
            },
        }
    }

    let background = matches!(args.last(), Some(last) if last.is_literal(BACKGROUND_MARKER));
    if background {
        args.pop();
    }

    log::debug!("tokenized {:?} (background: {})", args, background);
    Ok(TokenizedLine { args, background })
}
