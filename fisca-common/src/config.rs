//! Audit configuration loading
//!
//! Tolerances, thresholds and fiscal rates used by the control engine.
//! Resolution follows a fixed priority order:
//! 1. Command-line `--config` path (highest priority)
//! 2. `FISCA_AUDIT_CONFIG` environment variable
//! 3. User config file (`~/.config/fisca/audit.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! Explicitly requested files (1 and 2) must load. A missing or unreadable
//! user config file only logs a warning and falls back to defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "FISCA_AUDIT_CONFIG";

/// Canonical "equal within rounding" tolerance for debit/credit equality (currency units)
pub const EQUILIBRIUM_TOLERANCE: f64 = 0.01;

/// Tolerance for aggregate comparisons that are equal "to the unit"
pub const ROUNDING_TOLERANCE: f64 = 1.0;

/// Score ceiling applied while at least one blocking finding exists.
///
/// Kept below the 70 "warning" band so blocking findings always show as failing.
pub const BLOCKING_SCORE_CEILING: u8 = 49;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Debit/credit equality tolerance
    pub tolerance: f64,

    /// Tolerance for derived aggregates (results, balance sheet totals, deltas)
    pub rounding_tolerance: f64,

    /// Year-over-year variation threshold per account group, in percent
    pub variation_threshold_pct: f64,

    /// Year-over-year variation threshold for the balance sheet total, in percent
    pub bilan_variation_threshold_pct: f64,

    /// Maximum global score while blocking findings remain (0-100)
    pub blocking_score_ceiling: u8,

    /// Event bus capacity for progress broadcasting
    pub event_capacity: usize,

    /// Fiscal rates used by level 7 controls
    pub fiscal: FiscalRates,
}

/// Fiscal rates (Cote d'Ivoire CGI defaults)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalRates {
    /// Corporate income tax normal rate
    pub taux_is: f64,
    /// Minimum flat tax (IMF) rate applied to revenue
    pub taux_imf: f64,
    /// IMF floor
    pub imf_minimum: f64,
    /// IMF ceiling
    pub imf_maximum: f64,
    /// Depreciable ceiling for passenger vehicles
    pub plafond_vehicules: f64,
}

impl Default for FiscalRates {
    fn default() -> Self {
        Self {
            taux_is: 0.25,
            taux_imf: 0.005,
            imf_minimum: 3_000_000.0,
            imf_maximum: 35_000_000.0,
            plafond_vehicules: 25_000_000.0,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tolerance: EQUILIBRIUM_TOLERANCE,
            rounding_tolerance: ROUNDING_TOLERANCE,
            variation_threshold_pct: 50.0,
            bilan_variation_threshold_pct: 30.0,
            blocking_score_ceiling: BLOCKING_SCORE_CEILING,
            event_capacity: 100,
            fiscal: FiscalRates::default(),
        }
    }
}

impl AuditConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AuditConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be a non-negative number (got {})",
                self.tolerance
            )));
        }
        if !self.rounding_tolerance.is_finite() || self.rounding_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "rounding_tolerance must be a non-negative number (got {})",
                self.rounding_tolerance
            )));
        }
        let positive = |x: f64| x.is_finite() && x > 0.0;
        if !positive(self.variation_threshold_pct) || !positive(self.bilan_variation_threshold_pct) {
            return Err(Error::Config(
                "variation thresholds must be strictly positive".to_string(),
            ));
        }
        if self.blocking_score_ceiling > 100 {
            return Err(Error::Config(format!(
                "blocking_score_ceiling must be within 0-100 (got {})",
                self.blocking_score_ceiling
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        let fiscal = &self.fiscal;
        if !(0.0..=1.0).contains(&fiscal.taux_is) || !(0.0..=1.0).contains(&fiscal.taux_imf) {
            return Err(Error::Config("fiscal rates must be within 0.0-1.0".to_string()));
        }
        if fiscal.imf_minimum > fiscal.imf_maximum {
            return Err(Error::Config(format!(
                "imf_minimum ({}) exceeds imf_maximum ({})",
                fiscal.imf_minimum, fiscal.imf_maximum
            )));
        }
        if fiscal.plafond_vehicules < 0.0 {
            return Err(Error::Config("plafond_vehicules must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Configuration resolver applying the documented priority order
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create resolver, optionally with an explicit path from the command line
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve configuration
    pub fn resolve(&self) -> Result<AuditConfig> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            info!("Loading audit config from command line path: {}", path.display());
            return AuditConfig::load_from_file(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                info!("Loading audit config from {}: {}", CONFIG_ENV_VAR, path);
                return AuditConfig::load_from_file(Path::new(&path));
            }
        }

        // Priority 3: User config file
        if let Some(path) = default_config_path() {
            if path.exists() {
                match AuditConfig::load_from_file(&path) {
                    Ok(config) => {
                        info!("Loaded audit config from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(
                            "Ignoring unreadable config file {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                    }
                }
            } else {
                debug!("No config file at {}", path.display());
            }
        }

        // Priority 4: Compiled defaults
        Ok(AuditConfig::default())
    }
}

/// Platform config file location (`<config_dir>/fisca/audit.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fisca").join("audit.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuditConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.blocking_score_ceiling, 49);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AuditConfig::from_toml_str("variation_threshold_pct = 25.0\n").unwrap();
        assert_eq!(config.variation_threshold_pct, 25.0);
        assert_eq!(config.tolerance, EQUILIBRIUM_TOLERANCE);
        assert_eq!(config.fiscal.taux_is, 0.25);
    }

    #[test]
    fn test_nested_fiscal_table() {
        let config = AuditConfig::from_toml_str("[fiscal]\ntaux_is = 0.3\n").unwrap();
        assert_eq!(config.fiscal.taux_is, 0.3);
        assert_eq!(config.fiscal.imf_minimum, 3_000_000.0);
    }

    #[test]
    fn test_nan_variation_threshold_rejected() {
        let result = AuditConfig::from_toml_str("variation_threshold_pct = nan\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config = AuditConfig {
            bilan_variation_threshold_pct: f64::NAN,
            ..AuditConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let result = AuditConfig::from_toml_str("tolerance = -1.0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_ceiling_above_100_rejected() {
        let config = AuditConfig {
            blocking_score_ceiling: 120,
            ..AuditConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(AuditConfig::from_toml_str("tolerance = [").is_err());
    }
}
