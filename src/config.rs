//! Configuration types for quarry.toml

use serde::{Deserialize, Serialize};

use quarry_core::{MappingOptions, SchemaBuilder, TypeRegistry};
use quarry_migrations::Migrations;

/// Upgrade settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MigrationsConfig {
    /// Schema version the application expects
    #[serde(default = "default_target_version")]
    pub target_version: u32,
    /// Rebuild every table when no migration covers the stored version
    #[serde(default = "default_true")]
    pub allow_recreate_fallback: bool,
}

fn default_target_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u64 {
    5000
}

impl MigrationsConfig {
    /// An empty migration registry with this target version and fallback setting.
    pub fn migrations<C>(&self) -> Migrations<C> {
        let mut migrations = Migrations::new(self.target_version);
        migrations.allow_recreate_fallback(self.allow_recreate_fallback);
        migrations
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            target_version: default_target_version(),
            allow_recreate_fallback: default_true(),
        }
    }
}

/// Main configuration struct for quarry.toml
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Implicit mapping flags
    #[serde(default)]
    pub mapping: MappingOptions,
    /// Upgrade settings
    #[serde(default)]
    pub migrations: MigrationsConfig,
    /// Enforce foreign keys on every connection
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mapping: MappingOptions::default(),
            migrations: MigrationsConfig::default(),
            foreign_keys: default_true(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// A schema builder with the built-in conversions and this mapping configuration.
    pub fn schema_builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(TypeRegistry::new(), self.mapping.clone())
    }

    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}
