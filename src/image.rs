//! Encoded units and the final, gap-filled image.

use serde::Serialize;
use tracing::debug;

use crate::symbols::SymbolTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedUnit {
    pub address: u32,
    pub bytes: Vec<u8>,
    pub complete: bool,
    /// 1-based source line; `None` for gap filler.
    pub line: Option<usize>,
}

impl EncodedUnit {
    pub fn new(address: u32, bytes: Vec<u8>, line: Option<usize>) -> Self {
        Self { address, bytes, complete: true, line }
    }

    pub fn end(&self) -> u32 {
        self.address.saturating_add(self.bytes.len() as u32)
    }
}

/// Filler for `len` bytes: whole NOPs, then `fill` for any remainder.
fn gap_unit(address: u32, len: u32, nop: Option<&[u8]>, fill: u8) -> EncodedUnit {
    let len = len as usize;
    let mut bytes = Vec::with_capacity(len);
    if let Some(nop) = nop.filter(|n| !n.is_empty()) {
        while bytes.len() + nop.len() <= len {
            bytes.extend_from_slice(nop);
        }
    }
    bytes.resize(len, fill);
    EncodedUnit::new(address, bytes, None)
}

/// Two units claim the same bytes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unit at {address:#x} overlaps bytes already emitted up to {end:#x}")]
pub struct OverlapError {
    pub address: u32,
    pub end: u32,
    /// Source line of the later unit.
    pub line: Option<usize>,
}

/// Sort by address and insert one filler unit into every hole between
/// neighbours, so the byte stream is contiguous from the first unit.
pub fn fill_gaps(mut units: Vec<EncodedUnit>, nop: Option<&[u8]>, fill: u8) -> Result<Vec<EncodedUnit>, OverlapError> {
    units.sort_by_key(|u| u.address);
    let mut out: Vec<EncodedUnit> = Vec::with_capacity(units.len());
    let mut end: Option<u32> = None;
    for unit in units {
        match end {
            Some(prev_end) if prev_end > unit.address => {
                return Err(OverlapError { address: unit.address, end: prev_end, line: unit.line });
            }
            Some(prev_end) if prev_end < unit.address => {
                debug!(from = prev_end, to = unit.address, "filling gap");
                out.push(gap_unit(prev_end, unit.address - prev_end, nop, fill));
            }
            _ => {}
        }
        end = Some(unit.end());
        out.push(unit);
    }
    Ok(out)
}

/// Result of one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assembly {
    pub units: Vec<EncodedUnit>,
    pub symbols: SymbolTable,
}

impl Assembly {
    pub fn units(&self) -> &[EncodedUnit] {
        &self.units
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Address of the first byte of the image.
    pub fn base(&self) -> u32 {
        self.units.first().map_or(0, |u| u.address)
    }

    pub fn len(&self) -> usize {
        self.units.iter().map(|u| u.bytes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All bytes in address order.
    pub fn image(&self) -> Vec<u8> {
        self.units.iter().flat_map(|u| u.bytes.iter().copied()).collect()
    }
}
