use serde::{Deserialize, Serialize};

/// Layout knobs for one assembler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsmConfig {
    pub word_size: u32,      // bytes per memory word; labels count in words
    pub data_step: u32,      // address advance per `.DB` byte
    pub little_endian: bool, // byte order of encoded words
    pub nop_mnemonic: String,
    pub fill_byte: u8, // gap bytes that a whole NOP cannot cover
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            word_size: 2,
            data_step: 1,
            little_endian: true,
            nop_mnemonic: "NOP".to_string(),
            fill_byte: 0,
        }
    }
}

impl AsmConfig {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Word size clamped to at least one byte.
    pub fn word(&self) -> u32 {
        self.word_size.max(1)
    }

    /// `.DB` address advance, clamped to at least one byte so data never
    /// lands on top of itself.
    pub fn db_step(&self) -> u32 {
        self.data_step.max(1)
    }

    /// Next multiple of the word size at or after `address`.
    pub fn align(&self, address: u32) -> Option<u32> {
        let w = self.word();
        match address % w {
            0 => Some(address),
            rem => address.checked_add(w - rem),
        }
    }

    pub fn word_bytes(&self, value: u64) -> Vec<u8> {
        let width = (self.word() as usize).min(8);
        word_to_bytes(value, width, self.little_endian)
    }
}

/// Cut the low `width` bytes out of `word` in the requested order.
pub fn word_to_bytes(word: u64, width: usize, little_endian: bool) -> Vec<u8> {
    let width = width.min(8);
    if little_endian {
        word.to_le_bytes()[..width].to_vec()
    } else {
        word.to_be_bytes()[8 - width..].to_vec()
    }
}
