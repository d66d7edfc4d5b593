//! Operand encoder: resolve operand text to a value, then splice the value
//! into its field window of a bit template.

use std::cell::OnceCell;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::catalog::{KindShape, OperandKind};
use crate::num::parse_int;
use crate::template::{low_bits, BitTemplate};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OperandError {
    #[error("`{text}` is not a valid {kind} operand")]
    UnknownOperand { kind: String, text: String },
    #[error("{kind} operand {value} is outside [{min}, {max}]")]
    OutOfRange { kind: String, value: i64, min: i64, max: i64 },
    #[error("{kind} operand `{text}` has {found} parts, expected {expected}")]
    PartCount { kind: String, text: String, expected: usize, found: usize },
    #[error("field `{mask}` of {kind} is not present in template `{template}`")]
    FieldNotFound { kind: String, mask: char, template: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandValue {
    Scalar(i64),
    /// One value per aggregate part, in order.
    Composite(Vec<OperandValue>),
}

/// One placed field: `offset` counts from the least significant bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldValue {
    pub name: String,
    pub mask: Option<char>,
    pub offset: usize,
    pub width: usize,
    pub value: u64,
}

impl FieldValue {
    /// The field alone, all other bits zero.
    pub fn word(&self) -> u64 {
        (self.value & low_bits(self.width)) << self.offset
    }
}

/// Split aggregate operand text on `+` or whitespace. A `-` that follows a
/// part also starts a new, negative part, so `HL-4` reads as `HL`, `-4`.
pub fn split_parts(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '+' || c.is_whitespace() {
            if start < i {
                parts.push(&text[start..i]);
            }
            start = i + c.len_utf8();
        } else if c == '-' && start < i {
            parts.push(&text[start..i]);
            start = i;
        }
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

impl OperandKind {
    pub fn resolve(&self, text: &str) -> Result<OperandValue, OperandError> {
        let text = text.trim();
        match &self.shape {
            KindShape::KeyValue { pairs, .. } => pairs
                .get(&text.to_ascii_uppercase())
                .map(|&v| OperandValue::Scalar(v))
                .ok_or_else(|| self.unknown(text)),
            KindShape::Range { min, max, .. } => {
                let value = parse_int(text).ok_or_else(|| self.unknown(text))?;
                if value < *min || value > *max {
                    return Err(OperandError::OutOfRange { kind: self.name.clone(), value, min: *min, max: *max });
                }
                Ok(OperandValue::Scalar(value))
            }
            KindShape::Aggregate { parts } => {
                let texts = split_parts(text);
                if texts.len() != parts.len() {
                    return Err(OperandError::PartCount {
                        kind: self.name.clone(),
                        text: text.to_string(),
                        expected: parts.len(),
                        found: texts.len(),
                    });
                }
                parts
                    .iter()
                    .zip(texts)
                    .map(|(part, t)| part.resolve(t))
                    .collect::<Result<Vec<_>, _>>()
                    .map(OperandValue::Composite)
            }
        }
    }

    /// Describe where `value` lands in `template`, one entry per leaf field.
    pub fn fields(&self, template: &BitTemplate, value: &OperandValue) -> Result<Vec<FieldValue>, OperandError> {
        match (&self.shape, value) {
            (KindShape::Aggregate { parts }, OperandValue::Composite(values)) => {
                let mut out = Vec::new();
                for (part, v) in parts.iter().zip(values) {
                    out.extend(part.fields(template, v)?);
                }
                Ok(out)
            }
            (KindShape::KeyValue { mask, bits, .. } | KindShape::Range { mask, bits, .. }, OperandValue::Scalar(v)) => {
                let window = template.window(*mask).ok_or_else(|| OperandError::FieldNotFound {
                    kind: self.name.clone(),
                    mask: *mask,
                    template: template.as_str().to_string(),
                })?;
                let width = usize::from(*bits).min(window.len());
                Ok(vec![FieldValue {
                    name: self.name.clone(),
                    mask: Some(*mask),
                    offset: template.bit_len() - window.start - width,
                    width,
                    value: (*v as u64) & low_bits(width),
                }])
            }
            _ => Err(self.unknown(&format!("{value:?}"))),
        }
    }

    /// Field-word for `value`: zero everywhere except inside this kind's fields.
    pub fn splice(&self, template: &BitTemplate, value: &OperandValue) -> Result<u64, OperandError> {
        Ok(self.fields(template, value)?.iter().fold(0, |acc, f| acc | f.word()))
    }

    pub fn encode(&self, template: &BitTemplate, text: &str) -> Result<u64, OperandError> {
        self.splice(template, &self.resolve(text)?)
    }

    fn unknown(&self, text: &str) -> OperandError {
        OperandError::UnknownOperand { kind: self.name.clone(), text: text.to_string() }
    }
}

/// Operand text bound to its kind. The value is resolved on first use and
/// kept; identity is `(kind, text)`.
#[derive(Debug, Clone)]
pub struct Operand<'k> {
    kind: &'k OperandKind,
    text: String,
    resolved: OnceCell<Result<OperandValue, OperandError>>,
}

impl<'k> Operand<'k> {
    pub fn new(kind: &'k OperandKind, text: &str) -> Self {
        Self { kind, text: text.trim().to_string(), resolved: OnceCell::new() }
    }

    pub fn kind(&self) -> &'k OperandKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Result<&OperandValue, OperandError> {
        self.resolved.get_or_init(|| self.kind.resolve(&self.text)).as_ref().map_err(Clone::clone)
    }

    pub fn fields(&self, template: &BitTemplate) -> Result<Vec<FieldValue>, OperandError> {
        self.kind.fields(template, self.value()?)
    }
}

impl PartialEq for Operand<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.kind.name == other.kind.name && self.text == other.text
    }
}

impl Eq for Operand<'_> {}

impl Hash for Operand<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.name.hash(state);
        self.text.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> OperandKind {
        OperandKind::key_value("REG1", 'd', 3, (0..8).map(|i| (format!("R{i}"), i)))
    }

    #[test]
    fn key_value_is_case_insensitive() {
        assert_eq!(regs().resolve("r5"), Ok(OperandValue::Scalar(5)));
        assert!(matches!(regs().resolve("R9"), Err(OperandError::UnknownOperand { .. })));
    }

    #[test]
    fn range_checks_bounds() {
        let imm = OperandKind::range("IMM8", 'i', 8, 0, 255);
        assert_eq!(imm.resolve("0x7f"), Ok(OperandValue::Scalar(127)));
        assert_eq!(
            imm.resolve("256"),
            Err(OperandError::OutOfRange { kind: "IMM8".into(), value: 256, min: 0, max: 255 })
        );
        assert!(matches!(imm.resolve("label"), Err(OperandError::UnknownOperand { .. })));
    }

    #[test]
    fn parts_split_on_plus_space_and_minus() {
        assert_eq!(split_parts("HL+4"), vec!["HL", "4"]);
        assert_eq!(split_parts("HL 4"), vec!["HL", "4"]);
        assert_eq!(split_parts("HL-4"), vec!["HL", "-4"]);
        assert_eq!(split_parts("-4"), vec!["-4"]);
    }

    #[test]
    fn aggregate_resolves_positionally() {
        let pair = OperandKind::key_value("PAIR", 'p', 2, [("BC", 0), ("DE", 1), ("HL", 2)]);
        let off = OperandKind::range("OFF4s", 'f', 4, -8, 7);
        let mem = OperandKind::aggregate("MEM", vec![pair, off]);
        assert_eq!(
            mem.resolve("HL-3"),
            Ok(OperandValue::Composite(vec![OperandValue::Scalar(2), OperandValue::Scalar(-3)]))
        );
        assert!(matches!(mem.resolve("HL"), Err(OperandError::PartCount { expected: 2, found: 1, .. })));

        let t = BitTemplate::parse("01100000ppffff00").unwrap();
        // HL=10, -3 -> 1101
        assert_eq!(mem.encode(&t, "HL-3").unwrap(), 0b10_1101_00);
    }

    #[test]
    fn splice_zeroes_everything_else_and_truncates() {
        let t = BitTemplate::parse("1111ddd111111111").unwrap();
        let r = regs();
        assert_eq!(r.encode(&t, "R7").unwrap(), 0b111 << 9);
        let wide = OperandKind::range("BIG", 'd', 3, 0, 1000);
        assert_eq!(wide.encode(&t, "15").unwrap(), 0b111 << 9);
        assert!(wide.encode(&t, "1000").unwrap() < 1 << t.bit_len());
    }

    #[test]
    fn missing_field_is_reported() {
        let t = BitTemplate::parse("0000000000000000").unwrap();
        assert!(matches!(regs().encode(&t, "R1"), Err(OperandError::FieldNotFound { mask: 'd', .. })));
    }

    #[test]
    fn operand_identity_and_cached_value() {
        let k = regs();
        let a = Operand::new(&k, " R2 ");
        let b = Operand::new(&k, "R2");
        assert_eq!(a, b);
        assert_eq!(a.value(), Ok(&OperandValue::Scalar(2)));
        assert_eq!(a.value(), Ok(&OperandValue::Scalar(2)));
    }
}
