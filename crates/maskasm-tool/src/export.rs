//! Output formats for an assembled image.

use std::fmt::Write as _;

use serde::Serialize;

use maskasm::{Assembly, EncodedUnit, SymbolTable};

const RECORD_LEN: usize = 16;

/// `addr: bytes` rows of 16, addresses from the image base.
pub fn hex_dump(assembly: &Assembly) -> String {
    let base = assembly.base();
    let mut out = String::new();
    for (i, row) in assembly.image().chunks(16).enumerate() {
        let addr = base + (i * 16) as u32;
        let _ = write!(out, "{addr:08x}:");
        for b in row {
            let _ = write!(out, " {b:02x}");
        }
        out.push('\n');
    }
    out
}

fn record(out: &mut String, addr: u16, kind: u8, data: &[u8]) {
    let [hi, lo] = addr.to_be_bytes();
    let sum = [data.len() as u8, hi, lo, kind].iter().chain(data).fold(0u8, |acc, b| acc.wrapping_add(*b));
    let _ = write!(out, ":{:02X}{addr:04X}{kind:02X}", data.len());
    for b in data {
        let _ = write!(out, "{b:02X}");
    }
    let _ = writeln!(out, "{:02X}", sum.wrapping_neg());
}

/// Intel HEX: data records of up to 16 bytes, an extended linear address
/// record whenever the upper 16 address bits change, then EOF.
pub fn intel_hex(assembly: &Assembly) -> String {
    let mut out = String::new();
    let mut upper = 0u16;
    let mut addr = assembly.base();
    let image = assembly.image();
    let mut rest = image.as_slice();
    while !rest.is_empty() {
        let hi = (addr >> 16) as u16;
        if hi != upper {
            record(&mut out, 0, 0x04, &hi.to_be_bytes());
            upper = hi;
        }
        let to_boundary = 0x1_0000 - (addr & 0xFFFF) as usize;
        let n = rest.len().min(RECORD_LEN).min(to_boundary);
        record(&mut out, addr as u16, 0x00, &rest[..n]);
        rest = &rest[n..];
        addr = addr.wrapping_add(n as u32);
    }
    record(&mut out, 0, 0x01, &[]);
    out
}

/// JSON listing of every unit and symbol.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub base: u32,
    pub size: usize,
    pub units: &'a [EncodedUnit],
    pub symbols: &'a SymbolTable,
}

impl<'a> Report<'a> {
    pub fn new(assembly: &'a Assembly) -> Self {
        Self { base: assembly.base(), size: assembly.len(), units: assembly.units(), symbols: assembly.symbols() }
    }
}
