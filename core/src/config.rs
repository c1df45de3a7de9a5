//! Loading detector parameters from YAML radar configuration.
//!
//! Two document shapes are accepted:
//!
//! ```yaml
//! # a bare detection block
//! refWinSize: [8, 4]
//! guardWinSize: [4, 0]
//! K0: [5.0, 3.0]
//! maxEnable: 0
//! discardCellLeft: 0
//! discardCellRight: 0
//! powerThre: 0
//! numAntenna: 12
//! detectMethod: 1
//! ```
//!
//! or a full radar parameter document carrying the same block under a
//! `detectObj` key, next to sections this crate ignores.

use std::fs;
use std::path::Path;

use serde_yaml::Value;

use crate::types::DetectParams;

/// Key of the detection block inside a full radar parameter document.
const DETECT_SECTION: &str = "detectObj";

/// Errors raised while reading detector parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document has no `detectObj` section and is not a detection block")]
    MissingSection,
}

impl DetectParams {
    /// Parse a YAML document holding either a bare detection block or a
    /// radar parameter document with a `detectObj` section.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_yaml::from_str(yaml)?;

        if let Some(section) = doc.get(DETECT_SECTION) {
            return Ok(serde_yaml::from_value(section.clone())?);
        }
        if doc.get("refWinSize").is_none() {
            return Err(ConfigError::MissingSection);
        }
        Ok(serde_yaml::from_value(doc)?)
    }

    /// Read and parse a YAML file, see [`DetectParams::from_yaml_str`].
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Serialise to a bare YAML detection block.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_bare_block_with_integer_flags() {
        let yaml = "\
refWinSize: [6, 4]
guardWinSize: [2, 1]
K0: [5, 3.5]
maxEnable: 1
discardCellLeft: 2
discardCellRight: 3
powerThre: 10
numAntenna: 8
detectMethod: 1
";
        let params = DetectParams::from_yaml_str(yaml).unwrap();
        assert_eq!(params.ref_win_size, [6, 4]);
        assert_eq!(params.guard_win_size, [2, 1]);
        assert_eq!(params.k0, [5.0, 3.5]);
        assert!(params.max_enable);
        assert_eq!(params.discard_cell_left, 2);
        assert_eq!(params.discard_cell_right, 3);
        assert_eq!(params.power_thre, 10.0);
        assert_eq!(params.num_antenna, 8);
        assert_eq!(params.n_workers, 0);
    }

    #[test]
    fn parses_nested_detect_section() {
        let yaml = "\
rangeFFTObj:
  radarPlatform: IWR1843
detectObj:
  refWinSize: [8, 4]
  guardWinSize: [4, 0]
  K0: [5.0, 3.0]
  maxEnable: false
  numAntenna: 12
";
        let params = DetectParams::from_yaml_str(yaml).unwrap();
        assert_eq!(params.ref_win_size, [8, 4]);
        assert!(!params.max_enable);
        assert_eq!(params.detect_method, 1);
        assert_eq!(params.discard_cell_left, 0);
    }

    #[test]
    fn reads_parameters_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "detectObj:\n  refWinSize: [5, 2]\n  guardWinSize: [1, 1]\n  K0: [6, 3]\n  numAntenna: 4\n"
        )
        .unwrap();

        let params = DetectParams::from_yaml_file(file.path()).unwrap();
        assert_eq!(params.ref_win_size, [5, 2]);
        assert_eq!(params.k0, [6.0, 3.0]);
        assert_eq!(params.num_antenna, 4);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DetectParams::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn rejects_document_without_detection_block() {
        let err = DetectParams::from_yaml_str("rangeFFTObj:\n  n: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection));
    }

    #[test]
    fn yaml_keeps_configuration_key_names() {
        let yaml = DetectParams::default().to_yaml().unwrap();
        assert!(yaml.contains("refWinSize"));
        assert!(yaml.contains("K0"));
        assert_eq!(DetectParams::from_yaml_str(&yaml).unwrap(), DetectParams::default());
    }
}
