pub mod assembler;
pub mod catalog;
pub mod config;
pub mod directive;
pub mod encoder;
pub mod expr;
pub mod image;
pub mod line;
pub mod num;
pub mod operand;
pub mod rule;
pub mod symbols;
pub mod template;

pub use assembler::{AsmError, AsmErrorKind, Assembler, Phase};
pub use catalog::{Catalog, CatalogError, InstructionDef, InstructionSpec, OperandDef, OperandKind};
pub use config::AsmConfig;
pub use encoder::{EncodeError, Encoding, InstructionEncoder};
pub use image::{Assembly, EncodedUnit, OverlapError};
pub use symbols::{Symbol, SymbolTable};
