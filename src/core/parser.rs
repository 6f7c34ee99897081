use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::diagnostics::{Diagnostic, DiagnosticKind};
use super::languages::{Adapter, AdapterRegistry};
use super::model::{Language, SourceText, SourceUnit};

/// A file on disk to be analysed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub path: PathBuf,
    pub language_hint: Option<Language>,
}

impl FileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            language_hint: None,
        }
    }

    pub fn with_hint(mut self, language: Language) -> Self {
        self.language_hint = Some(language);
        self
    }
}

/// Result of parsing one file: the unit, when the file could be parsed at
/// all, plus whatever went wrong along the way
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub unit: Option<SourceUnit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    fn skipped(diagnostic: Diagnostic) -> Self {
        Self {
            unit: None,
            diagnostics: vec![diagnostic],
        }
    }
}

/// Multi-language code parser that delegates to the grammar adapters
#[derive(Debug, Clone)]
pub struct CodeParser {
    registry: Arc<AdapterRegistry>,
    max_file_size: usize,
}

impl CodeParser {
    pub fn new(registry: Arc<AdapterRegistry>, max_file_size: usize) -> Self {
        Self {
            registry,
            max_file_size,
        }
    }

    /// Read a file from disk; failures become `IOError` diagnostics
    pub fn load(&self, input: &FileInput) -> std::result::Result<SourceText, Diagnostic> {
        let io_error = |message: String| {
            Diagnostic::new(DiagnosticKind::IoError, message).in_file(&input.path)
        };

        let bytes = std::fs::read(&input.path)
            .map_err(|e| io_error(format!("failed to read file: {}", e)))?;
        if bytes.len() > self.max_file_size {
            return Err(io_error(format!(
                "file is {} bytes, above the {} byte limit",
                bytes.len(),
                self.max_file_size
            )));
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| io_error("file is not valid UTF-8".to_string()))?;

        Ok(SourceText {
            path: input.path.clone(),
            text,
            language_hint: input.language_hint,
        })
    }

    /// Parse one source text into a unit
    pub fn parse_source(&self, source: SourceText) -> ParseOutcome {
        let path = source.path.as_path();

        let language = match self.registry.resolve(path, source.language_hint) {
            Ok(language) => language,
            Err(_) => {
                debug!("Skipping {}: no adapter for this file type", path.display());
                return ParseOutcome::skipped(
                    Diagnostic::new(DiagnosticKind::UnsupportedLanguage, "no adapter for this file type")
                        .in_file(path),
                );
            }
        };

        if source.text.len() > self.max_file_size {
            return ParseOutcome::skipped(
                Diagnostic::new(
                    DiagnosticKind::IoError,
                    format!("file exceeds the {} byte limit", self.max_file_size),
                )
                .in_file(path),
            );
        }

        let mut diagnostics = Vec::new();
        let mut adapter = match Adapter::for_language(language) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!("No {} adapter available: {}", language, e);
                return ParseOutcome::skipped(
                    Diagnostic::new(DiagnosticKind::PartialParse, e.to_string()).in_file(path),
                );
            }
        };

        let tokens = match adapter.parse(&source.text, path) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::PartialParse, e.to_string()).in_file(path),
                );
                Vec::new()
            }
        };
        let file_docs = adapter.extract_file_docs(&source.text);

        debug!(
            "Parsed {} ({}): {} tokens",
            path.display(),
            language,
            tokens.len()
        );

        ParseOutcome {
            unit: Some(SourceUnit {
                content_hash: calculate_hash(&source.text),
                line_count: source.text.lines().count(),
                path: source.path,
                language,
                file_docs,
                tokens,
            }),
            diagnostics,
        }
    }

    /// Load and parse a file from disk
    pub fn parse_file(&self, input: &FileInput) -> ParseOutcome {
        match self.load(input) {
            Ok(source) => self.parse_source(source),
            Err(diagnostic) => {
                warn!("{}", diagnostic);
                ParseOutcome::skipped(diagnostic)
            }
        }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.registry.is_supported(path)
    }
}

/// Calculate SHA256 hash of content
pub fn calculate_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::RawToken;
    use tempfile::TempDir;

    fn declaration_count(unit: &SourceUnit) -> usize {
        unit.tokens
            .iter()
            .filter(|t| !matches!(t, RawToken::Call(_) | RawToken::Import(_) | RawToken::Malformed(_)))
            .count()
    }

    fn parser() -> CodeParser {
        CodeParser::new(Arc::new(AdapterRegistry::with_defaults()), 1024)
    }

    #[test]
    fn test_unsupported_extension_is_skipped() {
        let outcome = parser().parse_source(SourceText::new("notes.txt", "hello"));
        assert!(outcome.unit.is_none());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::UnsupportedLanguage);
        assert_eq!(outcome.diagnostics[0].file.as_deref(), Some(Path::new("notes.txt")));
    }

    #[test]
    fn test_hint_selects_adapter() {
        let source = SourceText::new("script", "def run():\n    pass\n").with_hint(Language::Python);
        let outcome = parser().parse_source(source);
        let unit = outcome.unit.expect("parsed unit");
        assert_eq!(unit.language, Language::Python);
        assert_eq!(declaration_count(&unit), 1);
        assert_eq!(unit.line_count, 2);
    }

    #[test]
    fn test_hash_depends_only_on_content() {
        let a = parser().parse_source(SourceText::new("a.py", "x = 1\n")).unit.unwrap();
        let b = parser().parse_source(SourceText::new("b/c.py", "x = 1\n")).unit.unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_size_limit() {
        let big = "x = 1\n".repeat(500);
        let outcome = parser().parse_source(SourceText::new("big.py", big));
        assert!(outcome.unit.is_none());
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::IoError);
    }

    #[test]
    fn test_missing_file_reports_io_error() {
        let dir = TempDir::new().unwrap();
        let outcome = parser().parse_file(&FileInput::new(dir.path().join("gone.cpp")));
        assert!(outcome.unit.is_none());
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::IoError);
    }

    #[test]
    fn test_parse_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("math.cpp");
        std::fs::write(&path, "int add(int a, int b) { return a + b; }\n").unwrap();

        let outcome = parser().parse_file(&FileInput::new(&path));
        let unit = outcome.unit.expect("parsed unit");
        assert_eq!(unit.language, Language::Cpp);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(declaration_count(&unit), 1);
    }
}
