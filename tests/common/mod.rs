#![allow(dead_code)]

use std::sync::Arc;

use maskasm::{AsmConfig, Assembler, Catalog, InstructionEncoder};

pub const DEMO_CATALOG: &str = include_str!("../../catalogs/demo16.json");

pub fn encoder() -> Arc<InstructionEncoder> {
    let catalog = Catalog::from_json_str(DEMO_CATALOG).expect("demo catalog loads");
    Arc::new(InstructionEncoder::new(Arc::new(catalog)))
}

pub fn assembler() -> Assembler {
    Assembler::new(encoder(), AsmConfig::default())
}
