//! Source line grammar: `[label:] (instruction | .DIRECTIVE args) [; comment]`.

use crate::num::is_identifier;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineBody {
    /// Label-only line; the label attaches to the next statement.
    Empty,
    Instruction { text: String },
    /// `keyword` is upper-cased and has no leading `.`.
    Directive { keyword: String, operands: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub label: Option<String>,
    pub body: LineBody,
    pub comment: Option<String>,
}

impl Line {
    /// The statement text without label or comment.
    pub fn statement(&self) -> String {
        match &self.body {
            LineBody::Empty => String::new(),
            LineBody::Instruction { text } => text.clone(),
            LineBody::Directive { keyword, operands } if operands.is_empty() => format!(".{keyword}"),
            LineBody::Directive { keyword, operands } => format!(".{keyword} {operands}"),
        }
    }
}

/// `Ok(None)` for blank and comment-only lines.
pub fn parse_line(number: usize, raw: &str) -> Result<Option<Line>, ParseError> {
    let (code, comment) = match raw.split_once(';') {
        Some((code, comment)) => (code, Some(comment.trim().to_string())),
        None => (raw, None),
    };
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }

    let (label, rest) = match code.split_once(':').filter(|_| !code.starts_with('.')) {
        Some((head, rest)) => {
            let head = head.trim();
            if !is_identifier(head) {
                return Err(ParseError(format!("invalid label `{head}`")));
            }
            (Some(head.to_string()), rest.trim())
        }
        None => (None, code),
    };

    let body = if rest.is_empty() {
        LineBody::Empty
    } else if let Some(directive) = rest.strip_prefix('.') {
        let (keyword, operands) = directive.split_once(char::is_whitespace).unwrap_or((directive, ""));
        if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError(format!("invalid directive `.{keyword}`")));
        }
        LineBody::Directive { keyword: keyword.to_ascii_uppercase(), operands: operands.trim().to_string() }
    } else {
        let opcode = rest.split_whitespace().next().unwrap_or_default();
        if !is_identifier(opcode) {
            return Err(ParseError(format!("invalid opcode `{opcode}`")));
        }
        LineBody::Instruction { text: rest.to_string() }
    };

    Ok(Some(Line { number, label, body, comment }))
}
