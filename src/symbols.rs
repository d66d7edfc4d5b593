use std::collections::BTreeMap;

use serde::Serialize;

use crate::num::parse_int;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Symbol {
    ByteAddress(u32),
    WordAddress(u32),
    Equate(String),
}

impl Symbol {
    pub fn numeric(&self) -> Option<i64> {
        match self {
            Symbol::ByteAddress(a) | Symbol::WordAddress(a) => Some(i64::from(*a)),
            Symbol::Equate(text) => parse_int(text),
        }
    }

    pub fn is_label(&self) -> bool {
        !matches!(self, Symbol::Equate(_))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("label `{0}` is already defined")]
pub struct DuplicateLabel(pub String);

/// Insert-once name table for one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolTable {
    entries: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn insert(&mut self, name: &str, symbol: Symbol) -> Result<(), DuplicateLabel> {
        if self.entries.contains_key(name) {
            return Err(DuplicateLabel(name.to_string()));
        }
        self.entries.insert(name.to_string(), symbol);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn equate(&self, name: &str) -> Option<&str> {
        match self.entries.get(name)? {
            Symbol::Equate(text) => Some(text),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_once() {
        let mut t = SymbolTable::new();
        t.insert("loop", Symbol::WordAddress(3)).unwrap();
        assert_eq!(t.insert("loop", Symbol::WordAddress(4)), Err(DuplicateLabel("loop".into())));
        assert_eq!(t.get("loop"), Some(&Symbol::WordAddress(3)));
        t.clear();
        assert!(t.is_empty());
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Symbol::Equate("0x10".into()).numeric(), Some(16));
        assert_eq!(Symbol::Equate("R1".into()).numeric(), None);
        assert_eq!(Symbol::ByteAddress(9).numeric(), Some(9));
        assert!(Symbol::WordAddress(1).is_label());
        assert!(!Symbol::Equate("1".into()).is_label());
    }
}
