//! Bit templates and the per-letter masks carved out of them.
//!
//! A template such as `00001dddrrr00000` reads most-significant bit first.
//! Literal `0`/`1` characters are fixed opcode bits; every letter marks the
//! window reserved for one operand field.

use std::collections::HashMap;
use std::ops::Range;

use bitvec::prelude::*;

use crate::catalog::CatalogError;

pub type Mask = BitVec<u8, Msb0>;

/// Widest instruction word the encoder assembles (one `u64`).
pub const MAX_TEMPLATE_BITS: usize = 64;

/// Same-length mask that is set wherever `template` holds `m`.
pub fn build_mask(m: char, template: &str) -> Mask {
    template.chars().map(|c| c == m).collect()
}

/// Read a mask as an unsigned integer, first bit most significant.
pub fn mask_to_word(bits: &BitSlice<u8, Msb0>) -> u64 {
    bits.iter().by_vals().fold(0u64, |acc, b| (acc << 1) | u64::from(b))
}

pub(crate) fn low_bits(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitTemplate {
    text: String,
    masks: HashMap<char, Mask>,
    zero: Mask,
}

impl BitTemplate {
    /// Whitespace and `_` are visual separators and are dropped.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let text: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '_').collect();
        let bits = text.chars().count();
        if bits == 0 || bits % 8 != 0 || bits > MAX_TEMPLATE_BITS {
            return Err(CatalogError::TemplateLength { template: raw.to_string(), bits });
        }
        if let Some(ch) = text.chars().find(|c| !matches!(c, '0' | '1') && !c.is_ascii_alphabetic()) {
            return Err(CatalogError::TemplateChar { template: raw.to_string(), ch });
        }
        let mut masks = HashMap::new();
        for c in text.chars() {
            masks.entry(c).or_insert_with(|| build_mask(c, &text));
        }
        Ok(Self { zero: bitvec![u8, Msb0; 0; bits], text, masks })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn bit_len(&self) -> usize {
        self.zero.len()
    }

    pub fn byte_width(&self) -> usize {
        self.bit_len() / 8
    }

    /// Mask for `m`; all zero when the letter does not occur.
    pub fn mask(&self, m: char) -> &BitSlice<u8, Msb0> {
        self.masks.get(&m).map(|b| b.as_bitslice()).unwrap_or(self.zero.as_bitslice())
    }

    /// From the first set bit of `m`'s mask up to the next clear bit.
    pub fn window(&self, m: char) -> Option<Range<usize>> {
        let mask = self.mask(m);
        let start = mask.first_one()?;
        let end = mask[start..].first_zero().map_or(mask.len(), |n| start + n);
        Some(start..end)
    }

    /// Field letters in order of first appearance.
    pub fn field_letters(&self) -> Vec<char> {
        let mut seen = Vec::new();
        for c in self.text.chars().filter(|c| c.is_ascii_alphabetic()) {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen
    }

    /// Positions holding literal `0` or `1`.
    pub fn literal_mask(&self) -> Mask {
        self.text.chars().map(|c| matches!(c, '0' | '1')).collect()
    }

    /// Field-word of the fixed opcode bits.
    pub fn opcode_word(&self) -> u64 {
        mask_to_word(self.mask('1'))
    }

    /// Place `value` into `window`; every bit outside the window is zero.
    /// Values wider than the window keep only their low-order bits.
    pub fn splice(&self, window: &Range<usize>, value: u64) -> u64 {
        let width = window.len();
        let shift = self.bit_len() - window.end;
        (value & low_bits(width)) << shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_marks_only_the_letter() {
        let m = build_mask('d', "00001dddrrr00000");
        assert_eq!(m.count_ones(), 3);
        assert_eq!(m.first_one(), Some(5));
        assert_eq!(mask_to_word(&m), 0b0000_0111_0000_0000);
    }

    #[test]
    fn separators_are_dropped() {
        let t = BitTemplate::parse("0000_1ddd rrr0_0000").unwrap();
        assert_eq!(t.as_str(), "00001dddrrr00000");
        assert_eq!(t.byte_width(), 2);
        assert_eq!(t.field_letters(), vec!['d', 'r']);
    }

    #[test]
    fn absent_letter_is_all_zero() {
        let t = BitTemplate::parse("00001dddrrr00000").unwrap();
        assert!(t.mask('x').not_any());
        assert_eq!(t.window('x'), None);
    }

    #[test]
    fn window_and_splice() {
        let t = BitTemplate::parse("00001dddrrr00000").unwrap();
        let w = t.window('r').unwrap();
        assert_eq!(w, 8..11);
        assert_eq!(t.splice(&w, 5), 0b101 << 5);
        // too wide: low bits survive
        assert_eq!(t.splice(&w, 0b1101), 0b101 << 5);
        assert_eq!(t.opcode_word(), 0b0000_1000_0000_0000);
    }

    #[test]
    fn rejects_bad_templates() {
        assert!(matches!(BitTemplate::parse("0101"), Err(CatalogError::TemplateLength { bits: 4, .. })));
        assert!(matches!(BitTemplate::parse("0000000?"), Err(CatalogError::TemplateChar { ch: '?', .. })));
    }
}
