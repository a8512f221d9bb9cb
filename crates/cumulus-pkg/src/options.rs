//! Packager options.

use serde::{Deserialize, Serialize};

use crate::{PackageError, Result};

/// Tunables for a packaging run.
///
/// Options can be built in code or read from YAML:
///
/// ```yaml
/// max-passes: 50
/// modules-enabled: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PackageOptions {
    /// Ceiling on fixpoint passes before giving up with a convergence error.
    pub max_passes: usize,

    /// Ceiling on nested module and include depth.
    pub max_module_depth: usize,

    /// Whether `Rain::Module` references and the `Modules` section are allowed.
    pub modules_enabled: bool,

    /// Whether anchors and aliases are flattened into copies at the end.
    pub flatten_aliases: bool,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            max_passes: 100,
            max_module_depth: 32,
            modules_enabled: true,
            flatten_aliases: true,
        }
    }
}

impl PackageOptions {
    /// Parse options from YAML text; missing fields take their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let options: PackageOptions =
            serde_yaml::from_str(text).map_err(|e| PackageError::Options(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_passes == 0 {
            return Err(PackageError::Options(
                "max-passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_max_module_depth(mut self, depth: usize) -> Self {
        self.max_module_depth = depth;
        self
    }

    pub fn with_modules_enabled(mut self, enabled: bool) -> Self {
        self.modules_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PackageOptions::default();
        assert_eq!(options.max_passes, 100);
        assert_eq!(options.max_module_depth, 32);
        assert!(options.modules_enabled);
        assert!(options.flatten_aliases);
    }

    #[test]
    fn test_from_yaml_partial() {
        let options = PackageOptions::from_yaml_str("max-passes: 5\nmodules-enabled: false\n").unwrap();
        assert_eq!(options.max_passes, 5);
        assert!(!options.modules_enabled);
        assert_eq!(options.max_module_depth, 32);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PackageOptions::from_yaml_str("max-pass: 5\n").unwrap_err();
        assert!(matches!(err, PackageError::Options(_)));
    }

    #[test]
    fn test_zero_passes_rejected() {
        assert!(PackageOptions::from_yaml_str("max-passes: 0\n").is_err());
    }
}
