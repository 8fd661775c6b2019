//! Compiler configuration (ambient stack): TOML on disk, embedded defaults,
//! overridden at the command line. Mirrors the teacher's `LintConfig`
//! loader — `serde` deserializes the table, `include_str!` embeds a
//! shipped default so the binary works with zero configuration files.

use serde::Deserialize;

const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

/// Per-run compiler configuration. `#[serde(default)]` on every field keeps
/// partial TOML files valid: an override file only needs to name the
/// settings it actually changes.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub codegen: CodegenConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Overrides for the declarative runtime jump table (§4.7): a BASIC
    /// runtime symbol name to a host function name, for linking against an
    /// alternate runtime library build.
    #[serde(default)]
    pub symbol_overrides: std::collections::HashMap<String, String>,
    #[serde(default = "default_stack_size")]
    pub stack_size_bytes: u32,
}

fn default_stack_size() -> u32 {
    1 << 20
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            symbol_overrides: std::collections::HashMap::new(),
            stack_size_bytes: default_stack_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodegenConfig {
    #[serde(default)]
    pub emit_textual_ir: bool,
    #[serde(default)]
    pub emit_cfg_dot: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            emit_textual_ir: false,
            emit_cfg_dot: false,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("embedded default_config.toml must parse")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl CompilerConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&text).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_parses() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.runtime.stack_size_bytes, 1 << 20);
    }

    #[test]
    fn partial_override_fills_remaining_defaults() {
        let cfg: CompilerConfig = toml::from_str("[codegen]\nemit_textual_ir = true\n").unwrap();
        assert!(cfg.codegen.emit_textual_ir);
        assert_eq!(cfg.runtime.stack_size_bytes, default_stack_size());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = CompilerConfig::load(std::path::Path::new("/nonexistent/fbc.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
