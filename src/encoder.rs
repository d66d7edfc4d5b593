//! Instruction encoder facade with a lazily filled, shared rule cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::trace;

use crate::catalog::{Catalog, CatalogError, InstructionSpec};
use crate::config::word_to_bytes;
use crate::num::{is_identifier, is_word_char};
use crate::operand::{FieldValue, OperandError};
use crate::rule::{split_opcode, InstructionRule};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),
    #[error("`{signature}` takes {expected} operand(s), found {found}")]
    Arity { signature: String, expected: usize, found: usize },
    #[error("operand {}: {source}", .index + 1)]
    Operand {
        index: usize,
        #[source]
        source: OperandError,
    },
    #[error("cannot encode `{text}`: {reason}")]
    EncodeFailed { text: String, reason: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Encoded bytes; `complete == false` means the bytes are a zero-filled
/// placeholder of the right length, waiting for label resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encoding {
    pub bytes: Vec<u8>,
    pub complete: bool,
}

/// Strip whitespace inside the operand portion and fold `+-` into `-`.
/// Whitespace between two word characters separates aggregate parts and
/// becomes `+`, so `HL 2` reads as `HL+2`.
pub fn normalize(text: &str) -> String {
    let (opcode, rest) = split_opcode(text);
    let mut operands = String::with_capacity(rest.len());
    let mut gap = false;
    for c in rest.chars() {
        if c.is_whitespace() {
            gap = true;
            continue;
        }
        if gap && is_word_char(c) && operands.ends_with(is_word_char) {
            operands.push('+');
        }
        gap = false;
        operands.push(c);
    }
    while operands.contains("+-") {
        operands = operands.replace("+-", "-");
    }
    if operands.is_empty() {
        opcode.to_string()
    } else {
        format!("{opcode} {operands}")
    }
}

pub struct InstructionEncoder {
    catalog: Arc<Catalog>,
    little_endian: bool,
    cache: Mutex<HashMap<String, Arc<InstructionRule>>>,
}

impl InstructionEncoder {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_byte_order(catalog, true)
    }

    pub fn with_byte_order(catalog: Arc<Catalog>, little_endian: bool) -> Self {
        Self { catalog, little_endian, cache: Mutex::new(HashMap::new()) }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn little_endian(&self) -> bool {
        self.little_endian
    }

    pub fn spec_for(&self, text: &str) -> Result<&InstructionSpec, EncodeError> {
        let (opcode, _) = split_opcode(text);
        self.catalog.find(opcode).ok_or_else(|| EncodeError::UnknownOpcode(opcode.to_string()))
    }

    /// Cached rule for `spec`. Compilation runs outside the lock; a racing
    /// duplicate is dropped in favour of whichever entry landed first.
    pub fn rule(&self, spec: &InstructionSpec) -> Result<Arc<InstructionRule>, EncodeError> {
        let key = spec.opcode().to_ascii_uppercase();
        if let Some(rule) = self.lock_cache().get(&key) {
            trace!(opcode = %key, "rule cache hit");
            return Ok(Arc::clone(rule));
        }
        let compiled = Arc::new(InstructionRule::compile(spec, &self.catalog)?);
        trace!(opcode = %key, "rule cache miss");
        Ok(Arc::clone(self.lock_cache().entry(key).or_insert(compiled)))
    }

    pub fn cached_rules(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<InstructionRule>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Encode `text`, tolerating operands that look like unresolved symbols.
    pub fn try_encode(&self, text: &str) -> Result<Encoding, EncodeError> {
        let text = normalize(text);
        let spec = self.spec_for(&text)?;
        let rule = self.rule(spec)?;
        match rule.encode(&text) {
            Ok(word) => {
                trace!(%text, word, "encoded");
                Ok(Encoding { bytes: word_to_bytes(word, spec.byte_width(), self.little_endian), complete: true })
            }
            Err(EncodeError::Operand { source: OperandError::UnknownOperand { text: operand, .. }, .. })
                if is_identifier(&operand) =>
            {
                trace!(%text, %operand, "deferred: operand looks like a symbol");
                Ok(Encoding { bytes: vec![0; spec.byte_width()], complete: false })
            }
            Err(err) => Err(err),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
        let enc = self.try_encode(text)?;
        if !enc.complete {
            return Err(EncodeError::EncodeFailed {
                text: text.trim().to_string(),
                reason: "an operand is an unresolved symbol".to_string(),
            });
        }
        Ok(enc.bytes)
    }

    pub fn describe(&self, text: &str) -> Result<Vec<FieldValue>, EncodeError> {
        let text = normalize(text);
        let rule = self.rule(self.spec_for(&text)?)?;
        rule.describe(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InstructionDef, OperandKind};

    fn encoder() -> InstructionEncoder {
        let reg = |name: &str, mask| OperandKind::key_value(name, mask, 3, (0..8).map(|i| (format!("R{i}"), i)));
        let def = |signature: &str, template: &str| InstructionDef {
            signature: signature.into(),
            description: String::new(),
            semantics: String::new(),
            template: template.into(),
        };
        let cat = Catalog::from_kinds(
            vec![reg("REG1", 'd'), reg("REG2", 'r'), OperandKind::range("ADDR11", 'a', 11, 0, 2047)],
            vec![
                def("ADD REG1, REG2", "00001ddd rrr00000"),
                def("ADDC REG1, REG2", "00111ddd rrr00000"),
                def("JMP ADDR11", "10000aaa aaaaaaaa"),
            ],
        )
        .unwrap();
        InstructionEncoder::new(Arc::new(cat))
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("  ADD  R1 , R2 "), "ADD R1,R2");
        assert_eq!(normalize("LD R1, HL + -4"), "LD R1,HL-4");
        assert_eq!(normalize("NOP"), "NOP");
        assert_eq!(normalize("LD R1, HL 2"), "LD R1,HL+2");
        assert_eq!(normalize("LD R1, HL -3"), "LD R1,HL-3");
    }

    #[test]
    fn encodes_little_endian_and_is_deterministic() {
        let enc = encoder();
        let a = enc.encode("ADD R3, R5").unwrap();
        assert_eq!(a, vec![0xA0, 0x0B]);
        assert_eq!(enc.encode("ADD R3, R5").unwrap(), a);
        assert_eq!(enc.cached_rules(), 1);
    }

    #[test]
    fn prefix_opcodes_do_not_collide() {
        let enc = encoder();
        assert_eq!(enc.encode("ADDC R0, R1").unwrap(), vec![0x20, 0x38]);
        assert_eq!(enc.encode("ADD R0, R1").unwrap(), vec![0x20, 0x08]);
    }

    #[test]
    fn label_operand_defers() {
        let enc = encoder();
        let out = enc.try_encode("JMP somewhere").unwrap();
        assert_eq!(out, Encoding { bytes: vec![0, 0], complete: false });
        assert!(matches!(enc.encode("JMP somewhere"), Err(EncodeError::EncodeFailed { .. })));
    }

    #[test]
    fn fatal_errors_are_not_deferred() {
        let enc = encoder();
        assert_eq!(enc.try_encode("FOO R1"), Err(EncodeError::UnknownOpcode("FOO".into())));
        assert!(matches!(
            enc.try_encode("JMP 4096"),
            Err(EncodeError::Operand { source: OperandError::OutOfRange { .. }, .. })
        ));
        assert!(matches!(enc.try_encode("ADD R1, 7"), Err(EncodeError::Operand { index: 1, .. })));
    }

    #[test]
    fn big_endian_order() {
        let enc = encoder();
        let be = InstructionEncoder::with_byte_order(Arc::new(enc.catalog().clone()), false);
        assert_eq!(be.encode("ADD R3, R5").unwrap(), vec![0x0B, 0xA0]);
    }

    #[test]
    fn shared_across_threads() {
        let enc = encoder();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        assert_eq!(enc.encode("JMP 2").unwrap(), vec![0x02, 0x80]);
                    }
                });
            }
        });
        assert_eq!(enc.cached_rules(), 1);
    }
}
