//! Compiles one catalog row into a matcher/encoder for instruction text.

use tracing::trace;

use crate::catalog::{Catalog, CatalogError, InstructionSpec, OperandKind};
use crate::encoder::EncodeError;
use crate::operand::{FieldValue, Operand};
use crate::template::BitTemplate;

/// Opcode token followed by its operands; `text` is expected in the
/// normalized `OPCODE a,b,c` form.
#[derive(Debug, Clone)]
pub struct InstructionRule {
    signature: String,
    opcode: String,
    kinds: Vec<OperandKind>,
    template: BitTemplate,
}

/// Split instruction text at the first whitespace into opcode and operand text.
pub fn split_opcode(text: &str) -> (&str, &str) {
    let t = text.trim();
    match t.split_once(char::is_whitespace) {
        Some((op, rest)) => (op, rest.trim()),
        None => (t, ""),
    }
}

/// Operand texts separated by `,`; empty input means no operands.
pub fn split_operands(rest: &str) -> Vec<&str> {
    if rest.trim().is_empty() {
        return Vec::new();
    }
    rest.split(',').map(str::trim).collect()
}

impl InstructionRule {
    pub fn compile(spec: &InstructionSpec, catalog: &Catalog) -> Result<Self, CatalogError> {
        let kinds = spec
            .operand_kinds()
            .iter()
            .map(|name| {
                catalog.kind(name).cloned().ok_or_else(|| CatalogError::UnboundOperandKind {
                    signature: spec.signature().to_string(),
                    kind: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!(signature = spec.signature(), "compiled instruction rule");
        Ok(Self {
            signature: spec.signature().to_string(),
            opcode: spec.opcode().to_string(),
            kinds,
            template: spec.template().clone(),
        })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn kinds(&self) -> &[OperandKind] {
        &self.kinds
    }

    pub fn byte_width(&self) -> usize {
        self.template.byte_width()
    }

    pub fn matches_opcode(&self, text: &str) -> bool {
        split_opcode(text).0.eq_ignore_ascii_case(&self.opcode)
    }

    /// Bind each operand text to its declared kind.
    pub fn operands<'r>(&'r self, text: &str) -> Result<Vec<Operand<'r>>, EncodeError> {
        if !self.matches_opcode(text) {
            return Err(EncodeError::UnknownOpcode(split_opcode(text).0.to_string()));
        }
        let (_, rest) = split_opcode(text);
        let texts = split_operands(rest);
        if texts.len() != self.kinds.len() {
            return Err(EncodeError::Arity {
                signature: self.signature.clone(),
                expected: self.kinds.len(),
                found: texts.len(),
            });
        }
        Ok(self.kinds.iter().zip(texts).map(|(k, t)| Operand::new(k, t)).collect())
    }

    /// The opcode's literal bits first, then every operand field in order.
    pub fn describe(&self, text: &str) -> Result<Vec<FieldValue>, EncodeError> {
        let mut fields = vec![FieldValue {
            name: self.opcode.clone(),
            mask: None,
            offset: 0,
            width: self.template.bit_len(),
            value: self.template.opcode_word(),
        }];
        for (index, operand) in self.operands(text)?.iter().enumerate() {
            let placed = operand.fields(&self.template).map_err(|source| EncodeError::Operand { index, source })?;
            fields.extend(placed);
        }
        Ok(fields)
    }

    /// OR of the opcode field-word and every operand field-word.
    pub fn encode(&self, text: &str) -> Result<u64, EncodeError> {
        Ok(self.describe(text)?.iter().fold(0, |acc, f| acc | f.word()))
    }
}
