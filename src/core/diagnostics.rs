use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::{EntityId, LineSpan};

/// Recoverable conditions recorded during an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UnsupportedLanguage,
    IoError,
    PartialParse,
    DuplicateDeclaration,
    UnresolvedReference,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::UnsupportedLanguage => "UnsupportedLanguage",
            DiagnosticKind::IoError => "IOError",
            DiagnosticKind::PartialParse => "PartialParse",
            DiagnosticKind::DuplicateDeclaration => "DuplicateDeclaration",
            DiagnosticKind::UnresolvedReference => "UnresolvedReference",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: Option<PathBuf>,
    pub span: Option<LineSpan>,
    /// Entity the diagnostic is about, when there is one
    pub subject: Option<EntityId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: None,
            span: None,
            subject: None,
            message: message.into(),
        }
    }

    pub fn in_file(mut self, file: &Path) -> Self {
        self.file = Some(file.to_path_buf());
        self
    }

    pub fn at(mut self, span: LineSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_subject(mut self, subject: EntityId) -> Self {
        self.subject = Some(subject);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(file) = &self.file {
            write!(f, " {}", file.display())?;
            if let Some(span) = &self.span {
                write!(f, ":{}", span)?;
            }
        }
        write!(f, " {}", self.message)
    }
}

/// Sort diagnostics into their canonical order and drop exact repeats
pub fn normalize(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort();
    diagnostics.dedup();
}

/// Count diagnostics per kind, in kind order
pub fn summarize(diagnostics: &[Diagnostic]) -> Vec<(DiagnosticKind, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for diagnostic in diagnostics {
        *counts.entry(diagnostic.kind).or_insert(0usize) += 1;
    }
    counts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location() {
        let diagnostic = Diagnostic::new(DiagnosticKind::PartialParse, "unterminated block")
            .in_file(Path::new("src/a.cpp"))
            .at(LineSpan::new(3, 9));
        assert_eq!(diagnostic.to_string(), "[PartialParse] src/a.cpp:3-9 unterminated block");
    }

    #[test]
    fn test_normalize_and_summarize() {
        let mut diagnostics = vec![
            Diagnostic::new(DiagnosticKind::UnresolvedReference, "b"),
            Diagnostic::new(DiagnosticKind::PartialParse, "a"),
            Diagnostic::new(DiagnosticKind::UnresolvedReference, "b"),
        ];
        normalize(&mut diagnostics);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::PartialParse);
        assert_eq!(
            summarize(&diagnostics),
            vec![
                (DiagnosticKind::PartialParse, 1),
                (DiagnosticKind::UnresolvedReference, 1)
            ]
        );
    }
}
