//! Two-pass assembler driver.
//!
//! Pass 1 walks the listing in order: directives run against the symbol
//! table, instructions are encoded as far as the current symbols allow and
//! laid out at their byte address. Pass 2 revisits every instruction that
//! referenced a symbol still unknown at the time and re-encodes it with the
//! complete table. Finalize sorts the units and fills address gaps with NOPs.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::KindShape;
use crate::config::AsmConfig;
use crate::directive::{DirectiveContext, DirectiveError, DirectiveRegistry};
use crate::encoder::{normalize, EncodeError, InstructionEncoder};
use crate::image::{fill_gaps, Assembly, EncodedUnit, OverlapError};
use crate::line::{parse_line, Line, LineBody};
use crate::num::{is_identifier, substitute_identifiers};
use crate::operand::{split_parts, OperandError};
use crate::rule::{split_opcode, split_operands};
use crate::symbols::{Symbol, SymbolTable};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("unknown operand: {0}")]
    UnknownOperand(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("duplicate label `{0}`")]
    DuplicateLabel(String),
    #[error("catalog inconsistency: {0}")]
    UnboundOperandKind(String),
    #[error("encode failed: {0}")]
    EncodeFailed(String),
    #[error("unknown directive `.{0}`")]
    UnknownDirective(String),
    #[error("directive: {0}")]
    Directive(String),
    #[error("address counter overflow")]
    AddressOverflow,
    #[error("{0}")]
    Overlap(OverlapError),
}

impl From<EncodeError> for AsmErrorKind {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnknownOpcode(op) => AsmErrorKind::UnknownOpcode(op),
            EncodeError::Arity { .. } => AsmErrorKind::Parse(err.to_string()),
            EncodeError::Operand { source: OperandError::OutOfRange { .. }, .. } => AsmErrorKind::OutOfRange(err.to_string()),
            EncodeError::Operand { source: OperandError::FieldNotFound { .. }, .. } | EncodeError::Catalog(_) => {
                AsmErrorKind::UnboundOperandKind(err.to_string())
            }
            EncodeError::Operand { .. } => AsmErrorKind::UnknownOperand(err.to_string()),
            EncodeError::EncodeFailed { .. } => AsmErrorKind::EncodeFailed(err.to_string()),
        }
    }
}

impl From<DirectiveError> for AsmErrorKind {
    fn from(err: DirectiveError) -> Self {
        match err {
            DirectiveError::Duplicate(dup) => AsmErrorKind::DuplicateLabel(dup.0),
            DirectiveError::OutOfRange { .. } => AsmErrorKind::OutOfRange(err.to_string()),
            DirectiveError::AddressOverflow => AsmErrorKind::AddressOverflow,
            other => AsmErrorKind::Directive(other.to_string()),
        }
    }
}

/// A fatal error, tied to the source line that caused it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind} (in `{text}`)")]
pub struct AsmError {
    pub line: usize,
    pub text: String,
    pub kind: AsmErrorKind,
}

impl AsmError {
    fn at(line: &Line, kind: impl Into<AsmErrorKind>) -> Self {
        Self { line: line.number, text: line.statement(), kind: kind.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Pass1,
    Pass2,
    Finalize,
    Done,
}

/// An instruction waiting for pass 2. `source` is the statement as written,
/// `text` the normalized form after equate substitution.
#[derive(Debug, Clone)]
struct Fixup {
    unit: usize,
    line: usize,
    source: String,
    text: String,
}

pub struct Assembler {
    encoder: Arc<InstructionEncoder>,
    directives: DirectiveRegistry,
    config: AsmConfig,
    symbols: SymbolTable,
    units: Vec<EncodedUnit>,
    fixups: Vec<Fixup>,
    pending_labels: Vec<String>,
    address: u32,
    phase: Phase,
}

impl Assembler {
    pub fn new(encoder: Arc<InstructionEncoder>, config: AsmConfig) -> Self {
        Self::with_directives(encoder, config, DirectiveRegistry::standard())
    }

    pub fn with_directives(encoder: Arc<InstructionEncoder>, config: AsmConfig, directives: DirectiveRegistry) -> Self {
        if encoder.little_endian() != config.little_endian {
            warn!("encoder and assembler disagree on byte order; instructions follow the encoder");
        }
        Self {
            encoder,
            directives,
            config,
            symbols: SymbolTable::new(),
            units: Vec::new(),
            fixups: Vec::new(),
            pending_labels: Vec::new(),
            address: 0,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &AsmConfig {
        &self.config
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    fn reset(&mut self) {
        self.phase = Phase::Init;
        self.symbols.clear();
        self.units.clear();
        self.fixups.clear();
        self.pending_labels.clear();
        self.address = 0;
    }

    /// Assemble a whole listing. Any error aborts the run without output.
    pub fn assemble(&mut self, source: &str) -> Result<Assembly, AsmError> {
        self.reset();
        let mut lines = Vec::new();
        for (i, raw) in source.lines().enumerate() {
            match parse_line(i + 1, raw) {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {}
                Err(e) => return Err(AsmError { line: i + 1, text: raw.trim().to_string(), kind: AsmErrorKind::Parse(e.0) }),
            }
        }

        self.enter(Phase::Pass1);
        for line in &lines {
            self.pass1(line)?;
        }
        if let Some(last) = lines.last() {
            self.bind_trailing_labels(last)?;
        }

        self.enter(Phase::Pass2);
        self.pass2()?;

        self.enter(Phase::Finalize);
        let nop = self.nop_bytes();
        let units = fill_gaps(std::mem::take(&mut self.units), nop.as_deref(), self.config.fill_byte).map_err(|overlap| {
            let line = overlap.line.unwrap_or(0);
            let text = lines.iter().find(|l| l.number == line).map(Line::statement).unwrap_or_default();
            AsmError { line, text, kind: AsmErrorKind::Overlap(overlap) }
        })?;

        self.enter(Phase::Done);
        debug!(units = units.len(), symbols = self.symbols.len(), "assembled");
        Ok(Assembly { units, symbols: std::mem::take(&mut self.symbols) })
    }

    fn pass1(&mut self, line: &Line) -> Result<(), AsmError> {
        let mut labels = std::mem::take(&mut self.pending_labels);
        labels.extend(line.label.iter().cloned());
        match &line.body {
            LineBody::Empty => self.pending_labels = labels,
            LineBody::Directive { keyword, operands } => {
                for label in &labels {
                    self.bind(line, label, Symbol::ByteAddress(self.address))?;
                }
                let handler = self
                    .directives
                    .get(keyword)
                    .ok_or_else(|| AsmError::at(line, AsmErrorKind::UnknownDirective(keyword.clone())))?;
                let mut ctx = DirectiveContext {
                    symbols: &mut self.symbols,
                    address: &mut self.address,
                    config: &self.config,
                    line: line.number,
                };
                let units = handler.apply(&mut ctx, operands).map_err(|e| AsmError::at(line, e))?;
                self.units.extend(units);
            }
            LineBody::Instruction { text } => {
                if !labels.is_empty() {
                    self.address = self.config.align(self.address).ok_or_else(|| AsmError::at(line, AsmErrorKind::AddressOverflow))?;
                    let word = self.address / self.config.word();
                    for label in &labels {
                        self.bind(line, label, Symbol::WordAddress(word))?;
                    }
                }
                let text = self.substitute_equates(text);
                let enc = self.encoder.try_encode(&text).map_err(|e| AsmError::at(line, e))?;
                if !enc.complete {
                    self.fixups.push(Fixup {
                        unit: self.units.len(),
                        line: line.number,
                        source: line.statement(),
                        text: normalize(&text),
                    });
                }
                let len = enc.bytes.len() as u32;
                self.units.push(EncodedUnit { address: self.address, bytes: enc.bytes, complete: enc.complete, line: Some(line.number) });
                self.address = self.address.checked_add(len).ok_or_else(|| AsmError::at(line, AsmErrorKind::AddressOverflow))?;
            }
        }
        Ok(())
    }

    fn bind_trailing_labels(&mut self, last: &Line) -> Result<(), AsmError> {
        if self.pending_labels.is_empty() {
            return Ok(());
        }
        let address = self.config.align(self.address).ok_or_else(|| AsmError::at(last, AsmErrorKind::AddressOverflow))?;
        let word = address / self.config.word();
        for label in std::mem::take(&mut self.pending_labels) {
            self.bind(last, &label, Symbol::WordAddress(word))?;
        }
        Ok(())
    }

    fn bind(&mut self, line: &Line, label: &str, symbol: Symbol) -> Result<(), AsmError> {
        debug!(label, ?symbol, line = line.number, "bind");
        self.symbols
            .insert(label, symbol)
            .map_err(|dup| AsmError::at(line, AsmErrorKind::DuplicateLabel(dup.0)))
    }

    /// Replace `EQU`/`DEF` names in the operand text; the opcode is left alone.
    fn substitute_equates(&self, text: &str) -> String {
        let (opcode, rest) = split_opcode(text);
        if rest.is_empty() {
            return opcode.to_string();
        }
        let rest = substitute_identifiers(rest, |name| self.symbols.equate(name).map(str::to_string));
        format!("{opcode} {rest}")
    }

    /// Text for a symbol used as an operand of a field; signed fields take
    /// the distance from the referencing unit.
    fn symbol_text(&self, name: &str, signed: bool, unit_address: u32) -> Option<String> {
        match self.symbols.get(name)? {
            Symbol::Equate(text) => Some(text.clone()),
            sym => {
                let target = sym.numeric()?;
                Some(if signed { (target - i64::from(unit_address)).to_string() } else { target.to_string() })
            }
        }
    }

    fn pass2(&mut self) -> Result<(), AsmError> {
        for fixup in std::mem::take(&mut self.fixups) {
            let address = self.units[fixup.unit].address;
            let fail = |kind: AsmErrorKind| AsmError { line: fixup.line, text: fixup.source.clone(), kind };
            let text = self.resolve_labels(&fixup.text, address).map_err(|e| fail(e.into()))?;
            let bytes = self.encoder.encode(&text).map_err(|e| match e {
                EncodeError::EncodeFailed { .. } => fail(self.unresolved(&text)),
                other => fail(other.into()),
            })?;
            debug!(line = fixup.line, address, %text, "resolved");
            let unit = &mut self.units[fixup.unit];
            unit.bytes = bytes;
            unit.complete = true;
        }
        Ok(())
    }

    /// Rewrite each operand of `text` that names a symbol.
    fn resolve_labels(&self, text: &str, unit_address: u32) -> Result<String, EncodeError> {
        let spec = self.encoder.spec_for(text)?;
        let catalog = self.encoder.catalog();
        let (opcode, rest) = split_opcode(text);
        let mut operands = Vec::new();
        for (i, operand) in split_operands(rest).into_iter().enumerate() {
            let kind = spec.operand_kinds().get(i).and_then(|name| catalog.kind(name));
            let resolved = match kind.map(|k| k.shape()) {
                Some(KindShape::Aggregate { parts }) => split_parts(operand)
                    .into_iter()
                    .enumerate()
                    .map(|(j, part)| {
                        let signed = parts.get(j).is_some_and(|p| p.is_signed());
                        self.resolve_token(part, signed, unit_address)
                    })
                    .collect::<Vec<_>>()
                    .join("+"),
                _ => self.resolve_token(operand, kind.is_some_and(|k| k.is_signed()), unit_address),
            };
            operands.push(resolved);
        }
        Ok(normalize(&format!("{opcode} {}", operands.join(","))))
    }

    fn resolve_token(&self, token: &str, signed: bool, unit_address: u32) -> String {
        if is_identifier(token) {
            if let Some(text) = self.symbol_text(token, signed, unit_address) {
                return text;
            }
        }
        token.to_string()
    }

    /// Why `text` still does not encode after every symbol is known. A name
    /// offered to a key-value kind is a bad operand, never a label.
    fn unresolved(&self, text: &str) -> AsmErrorKind {
        let strict = self
            .encoder
            .spec_for(text)
            .and_then(|spec| self.encoder.rule(spec))
            .and_then(|rule| rule.encode(text));
        match strict {
            Err(err) if self.rejected_by_key_value(&err) => err.into(),
            _ => AsmErrorKind::EncodeFailed(format!("undefined symbol in `{text}`")),
        }
    }

    fn rejected_by_key_value(&self, err: &EncodeError) -> bool {
        let EncodeError::Operand { source: OperandError::UnknownOperand { kind, .. }, .. } = err else {
            return false;
        };
        matches!(self.encoder.catalog().kind(kind).map(|k| k.shape()), Some(KindShape::KeyValue { .. }))
    }

    fn nop_bytes(&self) -> Option<Vec<u8>> {
        let nop = &self.config.nop_mnemonic;
        self.encoder.catalog().find(nop)?;
        match self.encoder.encode(nop) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(%nop, %err, "gap filler does not encode; using fill byte");
                None
            }
        }
    }
}
