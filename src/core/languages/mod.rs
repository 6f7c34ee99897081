//! Grammar adapters for the supported languages
//!
//! Each language gets its own module with a consistent interface for turning
//! source text into raw structural tokens. Adapters are selected through an
//! [`AdapterRegistry`] built once per invocation from configuration.

mod cpp;
mod csharp;
mod javascript;
pub mod lexical;
mod python;
mod shader;
mod tree_walk;

pub use cpp::CppAdapter;
pub use csharp::CSharpAdapter;
pub use javascript::JavaScriptAdapter;
pub use python::PythonAdapter;
pub use shader::ShaderAdapter;

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::ParsingConfig;
use crate::error::{CodeLensError, Result};
use super::model::{Language, RawToken};

/// Which kinds of structure an adapter can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub types: bool,
    pub members: bool,
    pub calls: bool,
}

/// Trait that all language adapters implement
pub trait LanguageAdapter {
    /// Parse source text into raw structural tokens. Syntax errors are
    /// reported as `Malformed` tokens, never as an `Err`.
    fn parse(&mut self, content: &str, file_path: &Path) -> Result<Vec<RawToken>>;

    /// Extract file-level documentation from source code
    fn extract_file_docs(&self, content: &str) -> Option<String>;

    fn capabilities(&self) -> Capabilities;
}

/// Closed set of adapters, one variant per language
pub enum Adapter {
    CSharp(CSharpAdapter),
    Shader(ShaderAdapter),
    Cpp(CppAdapter),
    Python(PythonAdapter),
    JavaScript(JavaScriptAdapter),
}

impl Adapter {
    pub fn for_language(language: Language) -> Result<Self> {
        Ok(match language {
            Language::CSharp => Adapter::CSharp(CSharpAdapter::new()?),
            Language::Shader => Adapter::Shader(ShaderAdapter::new()),
            Language::Cpp => Adapter::Cpp(CppAdapter::new()),
            Language::Python => Adapter::Python(PythonAdapter::new()?),
            Language::JavaScript => Adapter::JavaScript(JavaScriptAdapter::new()?),
        })
    }

    fn inner(&mut self) -> &mut dyn LanguageAdapter {
        match self {
            Adapter::CSharp(a) => a,
            Adapter::Shader(a) => a,
            Adapter::Cpp(a) => a,
            Adapter::Python(a) => a,
            Adapter::JavaScript(a) => a,
        }
    }

    pub fn parse(&mut self, content: &str, file_path: &Path) -> Result<Vec<RawToken>> {
        self.inner().parse(content, file_path)
    }

    pub fn extract_file_docs(&mut self, content: &str) -> Option<String> {
        self.inner().extract_file_docs(content)
    }

    pub fn capabilities(&mut self) -> Capabilities {
        self.inner().capabilities()
    }
}

/// Immutable extension → language table for one invocation
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    extensions: BTreeMap<String, Language>,
}

impl AdapterRegistry {
    /// Build the table from the enabled languages; configured extensions
    /// replace a language's defaults
    pub fn from_config(config: &ParsingConfig) -> Result<Self> {
        let mut extensions = BTreeMap::new();

        for name in &config.languages {
            let language = Language::from_name(name)
                .ok_or_else(|| CodeLensError::Config(format!("Unknown language '{}'", name)))?;

            match config.file_extensions.get(language.name()) {
                Some(custom) => {
                    for ext in custom {
                        extensions.insert(ext.trim_start_matches('.').to_ascii_lowercase(), language);
                    }
                }
                None => {
                    for ext in language.default_extensions() {
                        extensions.insert(ext.to_string(), language);
                    }
                }
            }
        }

        Ok(Self { extensions })
    }

    /// Registry with every language and its default extensions
    pub fn with_defaults() -> Self {
        let extensions = Language::ALL
            .iter()
            .flat_map(|language| {
                language
                    .default_extensions()
                    .iter()
                    .map(move |ext| (ext.to_string(), *language))
            })
            .collect();
        Self { extensions }
    }

    /// Select the language for a file; a hint wins over the extension
    pub fn resolve(&self, path: &Path, hint: Option<Language>) -> Result<Language> {
        if let Some(language) = hint {
            return Ok(language);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.extensions.get(&ext.to_ascii_lowercase()))
            .copied()
            .ok_or_else(|| CodeLensError::UnsupportedLanguage(path.to_path_buf()))
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.resolve(path, None).is_ok()
    }
}
