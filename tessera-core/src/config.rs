//! Configuration types

use crate::{ConfigError, TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How raw storage values are cast into canonical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastingConfig {
    /// Reject values that cannot be represented (enumeration values outside
    /// the option set, unparsable numbers) instead of coercing them.
    pub strict_validation: bool,
}

impl Default for CastingConfig {
    fn default() -> Self {
        Self {
            strict_validation: true,
        }
    }
}

/// Where prefetch (query result) entries are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefetchTier {
    /// Prefetch caching off. Mutations only invalidate the touched key.
    Disabled,
    /// Result sets cached in the process-local tier only.
    Local,
    /// Result sets cached in the shared tier only, so every coordinator on
    /// the backend sees the same entries and the same invalidations.
    Shared,
}

impl PrefetchTier {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Some(Self::Disabled),
            "local" => Some(Self::Local),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Master configuration for a Tessera deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TesseraConfig {
    pub casting: CastingConfig,
    /// Default for namespaces registered without an explicit policy.
    pub use_shared_cache: bool,
    pub prefetch: PrefetchTier,
    /// Directory for the LMDB shared backend, if one is used.
    pub lmdb_path: Option<PathBuf>,
    pub lmdb_map_size_mb: usize,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            casting: CastingConfig::default(),
            use_shared_cache: true,
            prefetch: PrefetchTier::Disabled,
            lmdb_path: None,
            lmdb_map_size_mb: 1024,
        }
    }
}

impl TesseraConfig {
    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.casting.strict_validation = strict;
        self
    }

    pub fn with_shared_cache(mut self, enabled: bool) -> Self {
        self.use_shared_cache = enabled;
        self
    }

    pub fn with_prefetch(mut self, tier: PrefetchTier) -> Self {
        self.prefetch = tier;
        self
    }

    pub fn with_lmdb(mut self, path: impl Into<PathBuf>, map_size_mb: usize) -> Self {
        self.lmdb_path = Some(path.into());
        self.lmdb_map_size_mb = map_size_mb;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TESSERA_STRICT_VALIDATION`: reject out-of-range values (default: true)
    /// - `TESSERA_USE_SHARED_CACHE`: default shared-tier use (default: true)
    /// - `TESSERA_PREFETCH`: `disabled`, `local` or `shared` (default: disabled)
    /// - `TESSERA_LMDB_PATH`: LMDB directory (default: unset)
    /// - `TESSERA_LMDB_MAP_SIZE_MB`: LMDB map size (default: 1024)
    ///
    /// Unparsable values fall back to the default; call [`validate`](Self::validate)
    /// afterwards to check ranges.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| {
            lookup(name)
                .and_then(|s| parse_flag(&s))
                .unwrap_or(default)
        };

        Self {
            casting: CastingConfig {
                strict_validation: flag(
                    "TESSERA_STRICT_VALIDATION",
                    defaults.casting.strict_validation,
                ),
            },
            use_shared_cache: flag("TESSERA_USE_SHARED_CACHE", defaults.use_shared_cache),
            prefetch: lookup("TESSERA_PREFETCH")
                .and_then(|s| PrefetchTier::parse(&s))
                .unwrap_or(defaults.prefetch),
            lmdb_path: lookup("TESSERA_LMDB_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .or(defaults.lmdb_path),
            lmdb_map_size_mb: lookup("TESSERA_LMDB_MAP_SIZE_MB")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.lmdb_map_size_mb),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - lmdb_map_size_mb > 0
    /// - prefetch tier `Shared` requires shared cache use
    pub fn validate(&self) -> TesseraResult<()> {
        if self.lmdb_map_size_mb == 0 {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: self.lmdb_map_size_mb.to_string(),
                reason: "lmdb_map_size_mb must be greater than 0".to_string(),
            }));
        }

        if self.prefetch == PrefetchTier::Shared && !self.use_shared_cache {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "prefetch".to_string(),
                value: "shared".to_string(),
                reason: "shared prefetch caching requires use_shared_cache".to_string(),
            }));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
