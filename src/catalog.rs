//! The operand and instruction catalog.
//!
//! The catalog is the registration table the encoder works from: operand
//! kinds by name and instruction specs in declaration order. All of its
//! consistency rules are checked once, when it is built.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::template::{BitTemplate, Mask};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("template `{template}` has {bits} bits; expected a non-zero multiple of 8, at most 64")]
    TemplateLength { template: String, bits: usize },
    #[error("template `{template}` contains invalid character `{ch}`")]
    TemplateChar { template: String, ch: char },
    #[error("`{signature}` names operand kind `{kind}`, which is not registered")]
    UnboundOperandKind { signature: String, kind: String },
    #[error("operand kind `{0}` is registered twice")]
    DuplicateKind(String),
    #[error("operand kind `{kind}`: {reason}")]
    BadKind { kind: String, reason: String },
    #[error("aggregate operand kind `{0}` refers back to itself")]
    CyclicKind(String),
    #[error("`{signature}`: field `{mask}` of kind `{kind}` does not occur in the template")]
    FieldNotFound { signature: String, kind: String, mask: char },
    #[error("`{signature}`: field `{mask}` of kind `{kind}` spans {found} contiguous bits of {total} set, kind declares {expected}")]
    FieldWidth { signature: String, kind: String, mask: char, expected: u8, found: usize, total: usize },
    #[error("`{signature}`: field `{mask}` overlaps a field already placed")]
    OverlappingFields { signature: String, mask: char },
    #[error("opcode `{0}` is declared by more than one instruction")]
    DuplicateOpcode(String),
    #[error("instruction signature is empty")]
    EmptySignature,
    #[error("catalog json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Json(err.to_string())
    }
}

/// Operand kind as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperandDef {
    KeyValue { name: String, mask: char, bits: u8, pairs: BTreeMap<String, i64> },
    Range { name: String, mask: char, bits: u8, min: i64, max: i64 },
    Aggregate { name: String, parts: Vec<String> },
}

impl OperandDef {
    pub fn name(&self) -> &str {
        match self {
            OperandDef::KeyValue { name, .. } | OperandDef::Range { name, .. } | OperandDef::Aggregate { name, .. } => name,
        }
    }
}

/// Instruction row as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionDef {
    pub signature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semantics: String,
    pub template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub operands: Vec<OperandDef>,
    #[serde(default)]
    pub instructions: Vec<InstructionDef>,
}

/// A compiled operand kind. Kinds whose name ends in a lowercase `s` are
/// signed, PC-relative fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandKind {
    pub(crate) name: String,
    pub(crate) shape: KindShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindShape {
    /// Keys are stored upper-cased; lookups are case-insensitive.
    KeyValue { mask: char, bits: u8, pairs: BTreeMap<String, i64> },
    Range { mask: char, bits: u8, min: i64, max: i64 },
    Aggregate { parts: Vec<OperandKind> },
}

impl OperandKind {
    pub fn key_value<K: Into<String>>(name: &str, mask: char, bits: u8, pairs: impl IntoIterator<Item = (K, i64)>) -> Self {
        let pairs = pairs.into_iter().map(|(k, v)| (k.into().to_ascii_uppercase(), v)).collect();
        Self { name: name.to_string(), shape: KindShape::KeyValue { mask, bits, pairs } }
    }

    pub fn range(name: &str, mask: char, bits: u8, min: i64, max: i64) -> Self {
        Self { name: name.to_string(), shape: KindShape::Range { mask, bits, min, max } }
    }

    pub fn aggregate(name: &str, parts: Vec<OperandKind>) -> Self {
        Self { name: name.to_string(), shape: KindShape::Aggregate { parts } }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &KindShape {
        &self.shape
    }

    pub fn is_signed(&self) -> bool {
        self.name.ends_with('s')
    }

    pub fn mask_char(&self) -> Option<char> {
        match self.shape {
            KindShape::KeyValue { mask, .. } | KindShape::Range { mask, .. } => Some(mask),
            KindShape::Aggregate { .. } => None,
        }
    }

    pub fn bits(&self) -> Option<u8> {
        match self.shape {
            KindShape::KeyValue { bits, .. } | KindShape::Range { bits, .. } => Some(bits),
            KindShape::Aggregate { .. } => None,
        }
    }

    /// Non-aggregate kinds, depth first.
    pub fn leaves(&self) -> Vec<&OperandKind> {
        match &self.shape {
            KindShape::Aggregate { parts } => parts.iter().flat_map(|p| p.leaves()).collect(),
            _ => vec![self],
        }
    }
}

/// One catalog row, parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSpec {
    signature: String,
    description: String,
    semantics: String,
    template: BitTemplate,
    opcode: String,
    operands: Vec<String>,
}

/// `"ADD REG1, REG2"` -> `("ADD", ["REG1", "REG2"])`.
pub fn split_signature(signature: &str) -> (&str, Vec<&str>) {
    let sig = signature.trim();
    let (opcode, rest) = sig.split_once(char::is_whitespace).unwrap_or((sig, ""));
    let operands = rest.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    (opcode, operands)
}

impl InstructionSpec {
    pub fn parse(def: &InstructionDef) -> Result<Self, CatalogError> {
        let (opcode, operands) = split_signature(&def.signature);
        if opcode.is_empty() {
            return Err(CatalogError::EmptySignature);
        }
        Ok(Self {
            signature: def.signature.trim().to_string(),
            description: def.description.clone(),
            semantics: def.semantics.clone(),
            template: BitTemplate::parse(&def.template)?,
            opcode: opcode.to_string(),
            operands: operands.into_iter().map(str::to_string).collect(),
        })
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn semantics(&self) -> &str {
        &self.semantics
    }

    pub fn template(&self) -> &BitTemplate {
        &self.template
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// Operand kind names in declared order.
    pub fn operand_kinds(&self) -> &[String] {
        &self.operands
    }

    pub fn byte_width(&self) -> usize {
        self.template.byte_width()
    }

    /// Every leaf field must occupy exactly one run of its declared width.
    pub fn check_widths(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        for kind in self.resolved_kinds(catalog)? {
            for leaf in kind.leaves() {
                let (Some(mask), Some(bits)) = (leaf.mask_char(), leaf.bits()) else { continue };
                let window = self.template.window(mask).ok_or_else(|| CatalogError::FieldNotFound {
                    signature: self.signature.clone(),
                    kind: leaf.name.clone(),
                    mask,
                })?;
                let total = self.template.mask(mask).count_ones();
                if window.len() != usize::from(bits) || total != window.len() {
                    return Err(CatalogError::FieldWidth {
                        signature: self.signature.clone(),
                        kind: leaf.name.clone(),
                        mask,
                        expected: bits,
                        found: window.len(),
                        total,
                    });
                }
            }
        }
        Ok(())
    }

    /// Opcode bits and every operand field must be pairwise disjoint, or the
    /// OR-merge of field-words would corrupt bits.
    pub fn check_disjoint(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        let mut used: Mask = self.template.literal_mask();
        for kind in self.resolved_kinds(catalog)? {
            for leaf in kind.leaves() {
                let Some(mask) = leaf.mask_char() else { continue };
                for i in self.template.mask(mask).iter_ones() {
                    if used[i] {
                        return Err(CatalogError::OverlappingFields { signature: self.signature.clone(), mask });
                    }
                    used.set(i, true);
                }
            }
        }
        Ok(())
    }

    fn resolved_kinds<'c>(&self, catalog: &'c Catalog) -> Result<Vec<&'c OperandKind>, CatalogError> {
        self.operands
            .iter()
            .map(|name| {
                catalog.kind(name).ok_or_else(|| CatalogError::UnboundOperandKind {
                    signature: self.signature.clone(),
                    kind: name.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: HashMap<String, OperandKind>,
    specs: Vec<InstructionSpec>,
    by_opcode: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(operands: Vec<OperandDef>, instructions: Vec<InstructionDef>) -> Result<Self, CatalogError> {
        let kinds = compile_kinds(&operands)?;
        let mut catalog = Catalog { kinds, ..Default::default() };
        for def in &instructions {
            catalog.add_spec(InstructionSpec::parse(def)?)?;
        }
        debug!(kinds = catalog.kinds.len(), instructions = catalog.specs.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Build from already compiled kinds, e.g. for tests and embedders.
    pub fn from_kinds(kinds: Vec<OperandKind>, instructions: Vec<InstructionDef>) -> Result<Self, CatalogError> {
        let mut map = HashMap::new();
        for kind in kinds {
            if map.contains_key(&kind.name) {
                return Err(CatalogError::DuplicateKind(kind.name));
            }
            map.insert(kind.name.clone(), kind);
        }
        let mut catalog = Catalog { kinds: map, ..Default::default() };
        for def in &instructions {
            catalog.add_spec(InstructionSpec::parse(def)?)?;
        }
        Ok(catalog)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        Self::new(file.operands, file.instructions)
    }

    fn add_spec(&mut self, spec: InstructionSpec) -> Result<(), CatalogError> {
        let key = spec.opcode.to_ascii_uppercase();
        if self.by_opcode.contains_key(&key) {
            return Err(CatalogError::DuplicateOpcode(spec.opcode.clone()));
        }
        spec.check_widths(self)?;
        spec.check_disjoint(self)?;
        let claimed: HashSet<char> = spec
            .resolved_kinds(self)?
            .iter()
            .flat_map(|k| k.leaves())
            .filter_map(|leaf| leaf.mask_char())
            .collect();
        for letter in spec.template.field_letters() {
            if !claimed.contains(&letter) {
                warn!(signature = %spec.signature, field = %letter, "template field is not bound to any operand; it encodes as zero");
            }
        }
        self.by_opcode.insert(key, self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    pub fn kind(&self, name: &str) -> Option<&OperandKind> {
        self.kinds.get(name)
    }

    pub fn specs(&self) -> &[InstructionSpec] {
        &self.specs
    }

    /// Whitespace-bounded, case-insensitive opcode lookup.
    pub fn find(&self, opcode: &str) -> Option<&InstructionSpec> {
        self.by_opcode.get(&opcode.to_ascii_uppercase()).map(|&i| &self.specs[i])
    }
}

fn compile_kinds(defs: &[OperandDef]) -> Result<HashMap<String, OperandKind>, CatalogError> {
    let mut by_name: HashMap<&str, &OperandDef> = HashMap::new();
    for def in defs {
        if by_name.insert(def.name(), def).is_some() {
            return Err(CatalogError::DuplicateKind(def.name().to_string()));
        }
    }
    let mut out = HashMap::new();
    for def in defs {
        let mut visiting = Vec::new();
        let kind = compile_kind(def, &by_name, &mut visiting)?;
        out.insert(kind.name.clone(), kind);
    }
    Ok(out)
}

fn compile_kind<'d>(
    def: &'d OperandDef,
    by_name: &HashMap<&str, &'d OperandDef>,
    visiting: &mut Vec<&'d str>,
) -> Result<OperandKind, CatalogError> {
    let bad = |reason: &str| CatalogError::BadKind { kind: def.name().to_string(), reason: reason.to_string() };
    let check_field = |mask: char, bits: u8| {
        if !mask.is_ascii_alphabetic() {
            return Err(bad("mask must be an ASCII letter"));
        }
        if bits == 0 || usize::from(bits) > crate::template::MAX_TEMPLATE_BITS {
            return Err(bad("bit width must be between 1 and 64"));
        }
        Ok(())
    };
    match def {
        OperandDef::KeyValue { name, mask, bits, pairs } => {
            check_field(*mask, *bits)?;
            if pairs.is_empty() {
                return Err(bad("no names declared"));
            }
            Ok(OperandKind::key_value(name, *mask, *bits, pairs.iter().map(|(k, v)| (k.as_str(), *v))))
        }
        OperandDef::Range { name, mask, bits, min, max } => {
            check_field(*mask, *bits)?;
            if min > max {
                return Err(bad("min is greater than max"));
            }
            Ok(OperandKind::range(name, *mask, *bits, *min, *max))
        }
        OperandDef::Aggregate { name, parts } => {
            if parts.is_empty() {
                return Err(bad("aggregate has no parts"));
            }
            if visiting.contains(&name.as_str()) {
                return Err(CatalogError::CyclicKind(name.clone()));
            }
            visiting.push(name);
            let mut compiled = Vec::with_capacity(parts.len());
            for part in parts {
                let part_def = by_name.get(part.as_str()).copied().ok_or_else(|| CatalogError::UnboundOperandKind {
                    signature: name.clone(),
                    kind: part.clone(),
                })?;
                compiled.push(compile_kind(part_def, by_name, visiting)?);
            }
            visiting.pop();
            Ok(OperandKind::aggregate(name, compiled))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str, mask: char) -> OperandDef {
        OperandDef::KeyValue {
            name: name.into(),
            mask,
            bits: 3,
            pairs: (0..8).map(|i| (format!("R{i}"), i)).collect(),
        }
    }

    fn insn(signature: &str, template: &str) -> InstructionDef {
        InstructionDef { signature: signature.into(), description: String::new(), semantics: String::new(), template: template.into() }
    }

    #[test]
    fn signature_split() {
        assert_eq!(split_signature("ADD REG1, REG2"), ("ADD", vec!["REG1", "REG2"]));
        assert_eq!(split_signature("NOP"), ("NOP", vec![]));
    }

    #[test]
    fn builds_and_finds_case_insensitively() {
        let cat = Catalog::new(
            vec![reg("REG1", 'd'), reg("REG2", 'r')],
            vec![insn("ADD REG1, REG2", "00001ddd rrr00000"), insn("ADDC REG1, REG2", "00111ddd rrr00000")],
        )
        .unwrap();
        assert_eq!(cat.find("add").unwrap().signature(), "ADD REG1, REG2");
        assert_eq!(cat.find("ADDC").unwrap().opcode(), "ADDC");
        assert!(cat.find("AD").is_none());
        assert_eq!(cat.find("ADD").unwrap().byte_width(), 2);
    }

    #[test]
    fn unbound_kind_is_rejected() {
        let err = Catalog::new(vec![reg("REG1", 'd')], vec![insn("ADD REG1, REG9", "00001dddrrr00000")]).unwrap_err();
        assert_eq!(err, CatalogError::UnboundOperandKind { signature: "ADD REG1, REG9".into(), kind: "REG9".into() });
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let err = Catalog::new(vec![reg("REG1", 'd')], vec![insn("INC REG1", "00001dd000000000")]).unwrap_err();
        assert!(matches!(err, CatalogError::FieldWidth { expected: 3, found: 2, .. }));
        let err = Catalog::new(vec![reg("REG1", 'd')], vec![insn("INC REG1", "0000dd0d00000000")]).unwrap_err();
        assert!(matches!(err, CatalogError::FieldWidth { found: 2, total: 3, .. }));
    }

    #[test]
    fn shared_mask_letter_overlaps() {
        let err = Catalog::new(
            vec![reg("REG1", 'd'), reg("REG2", 'd')],
            vec![insn("MOV REG1, REG2", "00011ddd00000000")],
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::OverlappingFields { mask: 'd', .. }));
    }

    #[test]
    fn duplicate_opcode_is_rejected() {
        let err = Catalog::new(
            vec![reg("REG1", 'd')],
            vec![insn("INC REG1", "00001ddd00000000"), insn("inc REG1", "00010ddd00000000")],
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateOpcode("inc".into()));
    }

    #[test]
    fn cyclic_aggregate_is_rejected() {
        let defs = vec![
            OperandDef::Aggregate { name: "A".into(), parts: vec!["B".into()] },
            OperandDef::Aggregate { name: "B".into(), parts: vec!["A".into()] },
        ];
        assert!(matches!(Catalog::new(defs, vec![]), Err(CatalogError::CyclicKind(_))));
    }

    #[test]
    fn loads_json() {
        let json = r#"{
            "operands": [
                { "kind": "key_value", "name": "PAIR", "mask": "p", "bits": 2, "pairs": { "BC": 0, "DE": 1, "HL": 2, "SP": 3 } },
                { "kind": "range", "name": "OFF4s", "mask": "f", "bits": 4, "min": -8, "max": 7 },
                { "kind": "aggregate", "name": "MEM", "parts": ["PAIR", "OFF4s"] }
            ],
            "instructions": [
                { "signature": "LEA MEM", "description": "load effective address", "template": "11000000 ppffff00" }
            ]
        }"#;
        let cat = Catalog::from_json_str(json).unwrap();
        let mem = cat.kind("MEM").unwrap();
        assert_eq!(mem.leaves().iter().map(|k| k.name()).collect::<Vec<_>>(), vec!["PAIR", "OFF4s"]);
        assert!(mem.leaves()[1].is_signed());
        assert_eq!(cat.find("lea").unwrap().description(), "load effective address");
    }
}
