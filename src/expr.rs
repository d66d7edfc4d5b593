//! Integer expressions for directive arguments: operands separated by
//! `+ - * / % << >> | &`, folded left to right.

use std::iter::Peekable;
use std::vec;

use crate::num::{is_identifier, is_word_char, parse_int};
use crate::symbols::SymbolTable;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("expected a number or symbol, found `{0}`")]
    BadOperand(String),
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("symbol `{0}` has no numeric value")]
    NotNumeric(String),
    #[error("unexpected `{0}`")]
    Unexpected(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Or,
    And,
}

impl BinOp {
    fn apply(self, lhs: i64, rhs: i64) -> Result<i64, ExprError> {
        let shift = || u32::try_from(rhs).map_err(|_| ExprError::Overflow);
        match self {
            BinOp::Add => lhs.checked_add(rhs).ok_or(ExprError::Overflow),
            BinOp::Sub => lhs.checked_sub(rhs).ok_or(ExprError::Overflow),
            BinOp::Mul => lhs.checked_mul(rhs).ok_or(ExprError::Overflow),
            BinOp::Div if rhs == 0 => Err(ExprError::DivideByZero),
            BinOp::Div => lhs.checked_div(rhs).ok_or(ExprError::Overflow),
            BinOp::Rem if rhs == 0 => Err(ExprError::DivideByZero),
            BinOp::Rem => lhs.checked_rem(rhs).ok_or(ExprError::Overflow),
            BinOp::Shl => lhs.checked_shl(shift()?).ok_or(ExprError::Overflow),
            BinOp::Shr => lhs.checked_shr(shift()?).ok_or(ExprError::Overflow),
            BinOp::Or => Ok(lhs | rhs),
            BinOp::And => Ok(lhs & rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Atom(&'a str),
    Op(BinOp),
    Minus,
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, ExprError> {
    let mut out = Vec::new();
    let mut rest = text.trim_start();
    while let Some(c) = rest.chars().next() {
        let (tok, len) = match c {
            '+' => (Token::Op(BinOp::Add), 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Op(BinOp::Mul), 1),
            '/' => (Token::Op(BinOp::Div), 1),
            '%' => (Token::Op(BinOp::Rem), 1),
            '|' => (Token::Op(BinOp::Or), 1),
            '&' => (Token::Op(BinOp::And), 1),
            '<' if rest.starts_with("<<") => (Token::Op(BinOp::Shl), 2),
            '>' if rest.starts_with(">>") => (Token::Op(BinOp::Shr), 2),
            c if is_word_char(c) => {
                let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
                (Token::Atom(&rest[..len]), len)
            }
            other => return Err(ExprError::Unexpected(other.to_string())),
        };
        out.push(tok);
        rest = rest[len..].trim_start();
    }
    Ok(out)
}

fn atom_value(atom: &str, symbols: &SymbolTable) -> Result<i64, ExprError> {
    if let Some(v) = parse_int(atom) {
        return Ok(v);
    }
    if !is_identifier(atom) {
        return Err(ExprError::BadOperand(atom.to_string()));
    }
    let sym = symbols.get(atom).ok_or_else(|| ExprError::UnknownSymbol(atom.to_string()))?;
    sym.numeric().ok_or_else(|| ExprError::NotNumeric(atom.to_string()))
}

fn operand(iter: &mut Peekable<vec::IntoIter<Token<'_>>>, symbols: &SymbolTable) -> Result<i64, ExprError> {
    let negate = iter.next_if_eq(&Token::Minus).is_some();
    match iter.next() {
        Some(Token::Atom(a)) => {
            let v = atom_value(a, symbols)?;
            if negate {
                v.checked_neg().ok_or(ExprError::Overflow)
            } else {
                Ok(v)
            }
        }
        Some(other) => Err(ExprError::Unexpected(format!("{other:?}"))),
        None => Err(ExprError::Empty),
    }
}

/// Evaluate `text`; symbols resolve through `symbols` (labels give their address).
pub fn eval(text: &str, symbols: &SymbolTable) -> Result<i64, ExprError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut iter = tokens.into_iter().peekable();
    let mut acc = operand(&mut iter, symbols)?;
    while let Some(tok) = iter.next() {
        let op = match tok {
            Token::Op(op) => op,
            Token::Minus => BinOp::Sub,
            Token::Atom(a) => return Err(ExprError::Unexpected(a.to_string())),
        };
        let rhs = operand(&mut iter, symbols)?;
        acc = op.apply(acc, rhs)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Symbol;

    #[test]
    fn literals_and_operators() {
        let t = SymbolTable::new();
        assert_eq!(eval("10", &t), Ok(10));
        assert_eq!(eval("-3", &t), Ok(-3));
        assert_eq!(eval("0x10 + 2", &t), Ok(18));
        assert_eq!(eval("1 << 4", &t), Ok(16));
        assert_eq!(eval("0xF0 >> 4", &t), Ok(15));
        assert_eq!(eval("7 % 4", &t), Ok(3));
        assert_eq!(eval("12 & 10", &t), Ok(8));
        assert_eq!(eval("12 | 3", &t), Ok(15));
        assert_eq!(eval("5 - -2", &t), Ok(7));
        assert_eq!(eval("2 + 3 * 4", &t), Ok(20));
    }

    #[test]
    fn symbols_resolve() {
        let mut t = SymbolTable::new();
        t.insert("BASE", Symbol::Equate("32".into())).unwrap();
        t.insert("loop", Symbol::WordAddress(4)).unwrap();
        t.insert("NAME", Symbol::Equate("R1".into())).unwrap();
        assert_eq!(eval("BASE * 2", &t), Ok(64));
        assert_eq!(eval("loop + 1", &t), Ok(5));
        assert_eq!(eval("NAME", &t), Err(ExprError::NotNumeric("NAME".into())));
        assert_eq!(eval("MISSING", &t), Err(ExprError::UnknownSymbol("MISSING".into())));
    }

    #[test]
    fn errors() {
        let t = SymbolTable::new();
        assert_eq!(eval("", &t), Err(ExprError::Empty));
        assert_eq!(eval("1 / 0", &t), Err(ExprError::DivideByZero));
        assert_eq!(eval("1 +", &t), Err(ExprError::Empty));
        assert!(matches!(eval("1 2", &t), Err(ExprError::Unexpected(_))));
        assert!(matches!(eval("(1)", &t), Err(ExprError::Unexpected(_))));
    }
}
