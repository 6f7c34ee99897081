use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CodeLensError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source code parsing configuration
    pub parsing: ParsingConfig,

    /// Diagram projection settings
    pub diagrams: DiagramConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Source directories to analyze
    pub source_dirs: Vec<PathBuf>,

    /// Glob patterns to ignore during discovery
    pub ignore_patterns: Vec<String>,

    /// Documentation output directory
    pub docs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Languages to support
    pub languages: Vec<String>,

    /// Extra or replacement file extensions per language
    pub file_extensions: BTreeMap<String, Vec<String>>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Depth bound for call-flow traversal from a root
    pub max_depth: usize,

    /// Whether class diagrams list member attributes
    pub include_members: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format
    pub format: String,

    /// Include a generation header in written files
    pub include_metadata: bool,

    /// Write a diagnostics report next to the generated docs
    pub write_diagnostics: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Unnamed Project".to_string(),
            source_dirs: vec![PathBuf::from("src")],
            ignore_patterns: vec![
                "target/".to_string(),
                "node_modules/".to_string(),
                ".git/".to_string(),
                "Library/".to_string(),
                "*.tmp".to_string(),
            ],
            docs_dir: PathBuf::from("docs"),
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            languages: vec![
                "csharp".to_string(),
                "shader".to_string(),
                "cpp".to_string(),
                "python".to_string(),
                "javascript".to_string(),
            ],
            file_extensions: BTreeMap::new(),
            max_file_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            include_members: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
            include_metadata: true,
            write_diagnostics: true,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CodeLensError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CodeLensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "CodeLens.toml",
                    "codelens.toml",
                    ".codelens.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
[diagrams]
max_depth = 2

[parsing]
languages = ["csharp"]
"#,
        )
        .unwrap();

        assert_eq!(config.diagrams.max_depth, 2);
        assert!(config.diagrams.include_members);
        assert_eq!(config.parsing.languages, vec!["csharp".to_string()]);
        assert_eq!(config.parsing.max_file_size, 1024 * 1024);
        assert_eq!(config.project.docs_dir, PathBuf::from("docs"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codelens.toml");

        let mut config = Config::default();
        config.project.name = "Shaders".to_string();
        config
            .parsing
            .file_extensions
            .insert("shader".to_string(), vec!["fx".to_string()]);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.project.name, "Shaders");
        assert_eq!(
            loaded.parsing.file_extensions.get("shader"),
            Some(&vec!["fx".to_string()])
        );
    }

    #[test]
    fn test_missing_explicit_path_uses_default() {
        let config = Config::load_or_default(Some("does/not/exist.toml")).unwrap();
        assert_eq!(config.diagrams.max_depth, 5);
    }
}
