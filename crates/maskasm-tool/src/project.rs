use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use maskasm::{AsmConfig, Assembler, Catalog, InstructionEncoder};

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
    Catalog::from_json_str(&text).with_context(|| format!("loading catalog {}", path.display()))
}

/// Defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<AsmConfig> {
    let Some(path) = path else { return Ok(AsmConfig::default()) };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    AsmConfig::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// A catalog and config pair, ready to hand out assemblers.
pub struct Project {
    pub encoder: Arc<InstructionEncoder>,
    pub config: AsmConfig,
}

impl Project {
    pub fn open(catalog: &Path, config: Option<&Path>) -> Result<Self> {
        let catalog = load_catalog(catalog)?;
        let config = load_config(config)?;
        let encoder = InstructionEncoder::with_byte_order(Arc::new(catalog), config.little_endian);
        Ok(Self { encoder: Arc::new(encoder), config })
    }

    pub fn assembler(&self) -> Assembler {
        Assembler::new(Arc::clone(&self.encoder), self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_means_defaults() {
        assert_eq!(load_config(None).unwrap(), AsmConfig::default());
    }

    #[test]
    fn project_from_files() {
        let dir = std::env::temp_dir().join(format!("maskasm-project-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let catalog = dir.join("cat.json");
        let config = dir.join("cfg.json");
        std::fs::write(&catalog, include_str!("../../../catalogs/demo16.json")).unwrap();
        std::fs::write(&config, r#"{ "little_endian": false }"#).unwrap();

        let project = Project::open(&catalog, Some(&config)).unwrap();
        assert!(!project.encoder.little_endian());
        let out = project.assembler().assemble("HALT\nJMP 1").unwrap();
        assert_eq!(out.image(), vec![0xFF, 0xFF, 0x80, 0x01]);

        assert!(Project::open(&dir.join("absent.json"), None).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
