//! Directive handlers and the keyword -> handler registration table.

use std::collections::HashMap;

use tracing::debug;

use crate::config::AsmConfig;
use crate::expr::{eval, ExprError};
use crate::image::EncodedUnit;
use crate::num::is_identifier;
use crate::symbols::{DuplicateLabel, Symbol, SymbolTable};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("syntax: {0}")]
    Syntax(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Duplicate(#[from] DuplicateLabel),
    #[error("value {value} does not fit in {bytes} byte(s)")]
    OutOfRange { value: i64, bytes: u32 },
    #[error("cannot move the address counter back from {from:#x} to {to:#x}")]
    Backwards { from: u32, to: u32 },
    #[error("address counter overflow")]
    AddressOverflow,
}

/// State a directive may read and change.
pub struct DirectiveContext<'a> {
    pub symbols: &'a mut SymbolTable,
    pub address: &'a mut u32,
    pub config: &'a AsmConfig,
    pub line: usize,
}

impl DirectiveContext<'_> {
    fn advance(&mut self, by: u32) -> Result<(), DirectiveError> {
        *self.address = self.address.checked_add(by).ok_or(DirectiveError::AddressOverflow)?;
        Ok(())
    }
}

pub trait DirectiveHandler: Send + Sync {
    fn keyword(&self) -> &'static str;
    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError>;
}

/// `name = rest`, with `name` a valid identifier.
fn binding<'o>(keyword: &str, operands: &'o str) -> Result<(&'o str, &'o str), DirectiveError> {
    let (name, rest) = operands
        .split_once('=')
        .ok_or_else(|| DirectiveError::Syntax(format!("expected `{keyword} name = value`")))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(DirectiveError::Syntax(format!("invalid name `{name}`")));
    }
    Ok((name, rest.trim()))
}

fn values(keyword: &str, operands: &str) -> Result<Vec<String>, DirectiveError> {
    let items: Vec<String> = operands.split(',').map(|v| v.trim().to_string()).collect();
    if items.iter().any(String::is_empty) {
        return Err(DirectiveError::Syntax(format!("`{keyword}` expects a comma separated value list")));
    }
    Ok(items)
}

/// `EQU name = expr`: bind the decimal value of `expr`.
pub struct Equ;

impl DirectiveHandler for Equ {
    fn keyword(&self) -> &'static str {
        "EQU"
    }

    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError> {
        let (name, expr) = binding(self.keyword(), operands)?;
        let value = eval(expr, ctx.symbols)?;
        debug!(name, value, "equ");
        ctx.symbols.insert(name, Symbol::Equate(value.to_string()))?;
        Ok(Vec::new())
    }
}

/// `DEF name = text`: bind replacement text verbatim.
pub struct Def;

impl DirectiveHandler for Def {
    fn keyword(&self) -> &'static str {
        "DEF"
    }

    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError> {
        let (name, text) = binding(self.keyword(), operands)?;
        if text.is_empty() {
            return Err(DirectiveError::Syntax(format!("`{name}` has no replacement text")));
        }
        debug!(name, text, "def");
        ctx.symbols.insert(name, Symbol::Equate(text.to_string()))?;
        Ok(Vec::new())
    }
}

/// `DB v, ...`: one single-byte unit per value, `data_step` apart.
pub struct Db;

impl DirectiveHandler for Db {
    fn keyword(&self) -> &'static str {
        "DB"
    }

    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError> {
        let mut units = Vec::new();
        for item in values(self.keyword(), operands)? {
            let value = eval(&item, ctx.symbols)?;
            let byte = u8::try_from(value).map_err(|_| DirectiveError::OutOfRange { value, bytes: 1 })?;
            units.push(EncodedUnit::new(*ctx.address, vec![byte], Some(ctx.line)));
            ctx.advance(ctx.config.db_step())?;
        }
        Ok(units)
    }
}

/// `DW v, ...`: one word per value in the configured byte order.
pub struct Dw;

impl DirectiveHandler for Dw {
    fn keyword(&self) -> &'static str {
        "DW"
    }

    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError> {
        let width = ctx.config.word().min(8);
        let bits = width * 8;
        let (min, max) = if bits >= 64 { (i64::MIN, i64::MAX) } else { (-(1i64 << (bits - 1)), (1i64 << bits) - 1) };
        let mut units = Vec::new();
        for item in values(self.keyword(), operands)? {
            let value = eval(&item, ctx.symbols)?;
            if value < min || value > max {
                return Err(DirectiveError::OutOfRange { value, bytes: width });
            }
            units.push(EncodedUnit::new(*ctx.address, ctx.config.word_bytes(value as u64), Some(ctx.line)));
            ctx.advance(width)?;
        }
        Ok(units)
    }
}

/// `ORG addr`: move the address counter forward; Finalize fills the hole.
pub struct Org;

impl DirectiveHandler for Org {
    fn keyword(&self) -> &'static str {
        "ORG"
    }

    fn apply(&self, ctx: &mut DirectiveContext<'_>, operands: &str) -> Result<Vec<EncodedUnit>, DirectiveError> {
        let value = eval(operands, ctx.symbols)?;
        let to = u32::try_from(value).map_err(|_| DirectiveError::OutOfRange { value, bytes: 4 })?;
        if to < *ctx.address {
            return Err(DirectiveError::Backwards { from: *ctx.address, to });
        }
        *ctx.address = to;
        Ok(Vec::new())
    }
}

/// Keyword -> handler table, filled once at start-up.
pub struct DirectiveRegistry {
    handlers: HashMap<&'static str, Box<dyn DirectiveHandler>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// `EQU`, `DEF`, `DB`, `DW` and `ORG`.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(Equ));
        reg.register(Box::new(Def));
        reg.register(Box::new(Db));
        reg.register(Box::new(Dw));
        reg.register(Box::new(Org));
        reg
    }

    pub fn register(&mut self, handler: Box<dyn DirectiveHandler>) {
        self.handlers.insert(handler.keyword(), handler);
    }

    /// Keywords are matched upper-case.
    pub fn get(&self, keyword: &str) -> Option<&dyn DirectiveHandler> {
        self.handlers.get(keyword.to_ascii_uppercase().as_str()).map(|h| h.as_ref())
    }

    pub fn keywords(&self) -> Vec<&'static str> {
        let mut k: Vec<_> = self.handlers.keys().copied().collect();
        k.sort_unstable();
        k
    }
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
