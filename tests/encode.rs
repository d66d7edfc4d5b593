mod common;

use pretty_assertions::assert_eq;

use maskasm::catalog::InstructionDef;
use maskasm::{Catalog, CatalogError, EncodeError, OperandKind};

#[test]
fn add_template_exact_word() {
    let enc = common::encoder();
    // 00001 011 101 00000
    assert_eq!(enc.encode("ADD R3, R5").unwrap(), 0x0BA0u16.to_le_bytes().to_vec());
}

#[test]
fn encoding_is_deterministic() {
    let enc = common::encoder();
    for text in ["ADD R3, R5", "LD R2, SP+7", "ST DE-8, R4", "BR C, -128", "LDW R7, 65535"] {
        assert_eq!(enc.encode(text).unwrap(), enc.encode(text).unwrap(), "{text}");
    }
}

#[test]
fn byte_width_never_depends_on_value() {
    let enc = common::encoder();
    for spec in enc.catalog().specs().iter().filter(|s| s.operand_kinds().is_empty()) {
        assert_eq!(enc.encode(spec.opcode()).unwrap().len(), spec.byte_width());
    }
    assert_eq!(enc.encode("LDW R0, 0").unwrap().len(), 4);
    assert_eq!(enc.encode("LDW R0, 65535").unwrap().len(), 4);
}

#[test]
fn every_demo_spec_has_disjoint_fields() {
    let enc = common::encoder();
    for spec in enc.catalog().specs() {
        spec.check_disjoint(enc.catalog()).unwrap();
    }
}

#[test]
fn overlap_is_detected() {
    let reg = |name: &str| OperandKind::key_value(name, 'd', 3, (0..8).map(|i| (format!("R{i}"), i)));
    let err = Catalog::from_kinds(
        vec![reg("REG1"), reg("REG2")],
        vec![InstructionDef {
            signature: "MOV REG1, REG2".into(),
            description: String::new(),
            semantics: String::new(),
            template: "00011ddd 00000000".into(),
        }],
    )
    .unwrap_err();
    assert_eq!(err, CatalogError::OverlappingFields { signature: "MOV REG1, REG2".into(), mask: 'd' });
}

#[test]
fn aggregate_parts_split_on_space_or_sign() {
    let enc = common::encoder();
    let plus = enc.encode("LD R2, SP+7").unwrap();
    assert_eq!(enc.encode("LD R2, SP 7").unwrap(), plus);
    assert_eq!(enc.encode("LD R2, SP + 7").unwrap(), plus);
    assert_eq!(enc.encode("LD R2, HL -3").unwrap(), enc.encode("LD R2, HL-3").unwrap());
}

#[test]
fn describe_reports_field_tuples() {
    let enc = common::encoder();
    let fields = enc.describe("LD R1, HL-3").unwrap();
    let view: Vec<_> = fields.iter().map(|f| (f.name.as_str(), f.offset, f.width, f.value)).collect();
    assert_eq!(
        view,
        vec![("LD", 0, 16, 0x6000), ("REG1", 8, 3, 1), ("PAIR", 6, 2, 2), ("OFF4s", 2, 4, 0b1101)]
    );
}

#[test]
fn try_encode_defers_symbols_only() {
    let enc = common::encoder();
    let pending = enc.try_encode("CALL later").unwrap();
    assert_eq!((pending.bytes, pending.complete), (vec![0, 0], false));
    assert!(matches!(enc.try_encode("CALL 0x1000"), Err(EncodeError::Operand { .. })));
    assert_eq!(enc.try_encode("nope"), Err(EncodeError::UnknownOpcode("nope".into())));
}
