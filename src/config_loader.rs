use crate::config::EmulationConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::Path;

/// Load, parse and validate an emulation description from a YAML file
pub fn load_config(config_path: &Path) -> Result<EmulationConfig> {
    info!("Loading emulation description from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open {}", config_path.display()))?;

    let config: EmulationConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse {}", config_path.display()))?;

    config.validate()?;

    if config.services.web.is_empty() && !config.bindings.is_empty() {
        warn!("Bindings are declared but no service installs a virtual node");
    }
    info!(
        "Loaded emulation '{}': {} autonomous systems, {} internet exchanges, {} bindings",
        config.general.name,
        config.autonomous_systems.len(),
        config.internet_exchanges.len(),
        config.bindings.len()
    );

    Ok(config)
}

/// Parse and validate an emulation description held in memory
pub fn parse_config(yaml: &str) -> Result<EmulationConfig> {
    let config: EmulationConfig = serde_yaml::from_str(yaml).wrap_err("Failed to parse emulation description")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
general:
  name: loader-test
  seed: 7
autonomous_systems:
  - asn: 150
    networks:
      - name: net0
    hosts:
      - name: web
        network: net0
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.general.name, "loader-test");
        assert_eq!(config.general.seed, 7);
        assert_eq!(config.autonomous_systems[0].hosts[0].name, "web");
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "general:\n  name: \"\"\n").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("name cannot be empty"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/emulation.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_parse_config_from_string() {
        let config = parse_config("general:\n  name: inline\n").unwrap();
        assert!(config.virtual_nodes.is_empty());
    }
}
