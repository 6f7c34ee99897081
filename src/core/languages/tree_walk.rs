//! Helpers shared by the tree-sitter based adapters

use std::ops::Range;

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{CodeLensError, Result};
use super::lexical::{self, CallScanner, CommentSyntax, LineIndex};
use crate::core::model::{LineSpan, TokenStream};

/// Source text plus the derived views the adapters need
pub(super) struct SourceView<'a> {
    pub source: &'a str,
    pub lines: Vec<&'a str>,
    masked: String,
    index: LineIndex,
    syntax: &'static CommentSyntax,
}

impl<'a> SourceView<'a> {
    pub fn new(source: &'a str, syntax: &'static CommentSyntax) -> Self {
        Self {
            source,
            lines: source.lines().collect(),
            masked: lexical::mask(source, syntax),
            index: LineIndex::new(source),
            syntax,
        }
    }

    pub fn text(&self, node: Node) -> &'a str {
        &self.source[node.byte_range()]
    }

    pub fn span(&self, node: Node) -> LineSpan {
        LineSpan::new(node.start_position().row + 1, node.end_position().row + 1)
    }

    /// Comment run directly above the declaration starting at `row`
    pub fn docs_at(&self, row: usize) -> Option<String> {
        lexical::doc_comment_before(&self.lines, row, self.syntax)
    }

    /// Whitespace-squashed source from `start` up to `end`
    pub fn signature(&self, start: usize, end: usize) -> String {
        let end = end.min(self.source.len());
        lexical::squash_whitespace(&self.source[start.min(end)..end])
    }

    /// Call sites inside `node`, with comments and strings masked out
    pub fn calls(&self, scanner: &CallScanner, node: Node) -> Vec<(String, usize)> {
        scanner.scan(&self.masked, node.byte_range(), &self.index)
    }
}

pub(super) fn parse_tree(parser: &mut Parser, content: &str, language: &str) -> Result<Tree> {
    parser
        .parse(content, None)
        .ok_or_else(|| CodeLensError::Parser(format!("Failed to parse {} code", language)))
}

pub(super) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub(super) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub(super) fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    children(node).into_iter().find(|c| kinds.contains(&c.kind()))
}

pub(super) fn has_token(node: Node, token: &str) -> bool {
    children(node).iter().any(|c| c.kind() == token)
}

/// Record an ERROR or MISSING node as a malformed region
pub(super) fn report(tokens: &mut TokenStream, view: &SourceView, node: Node) {
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let snippet: String = view.text(node).chars().take(40).collect();
        format!("syntax error near `{}`", lexical::squash_whitespace(&snippet))
    };
    tokens.malformed(view.span(node), message);
}

/// Record a declaration dropped because its subtree contains an error
pub(super) fn report_dropped(tokens: &mut TokenStream, view: &SourceView, node: Node, what: &str) {
    tokens.malformed(view.span(node), format!("malformed {} skipped", what));
}

/// A type whose header is broken, or whose body holds an error outside any
/// member that can drop itself (an unterminated block shows up this way)
pub(super) fn malformed_type(node: Node, body: Option<Node>, member_kinds: &[&str]) -> bool {
    let body_id = body.map(|b| b.id());
    let header_broken = children(node)
        .into_iter()
        .filter(|c| Some(c.id()) != body_id)
        .any(|c| c.is_error() || c.is_missing() || c.has_error());
    let body_broken = body.map_or(false, |b| {
        b.is_missing()
            || children(b).into_iter().any(|c| {
                c.is_error() || c.is_missing() || (c.has_error() && !member_kinds.contains(&c.kind()))
            })
    });
    header_broken || body_broken
}

/// Start of the first unindented line inside `node` after its first line.
/// Declarations swallowed by an unterminated block start again there.
pub(super) fn recovery_offset(source: &str, node: Node) -> Option<usize> {
    let range = node.byte_range();
    let text = source.get(range.clone())?;
    let mut offset = range.start + text.find('\n')? + 1;
    for line in source[offset..range.end].split_inclusive('\n') {
        let starts_code = line
            .chars()
            .next()
            .map_or(false, |c| !c.is_whitespace() && !matches!(c, '}' | ')' | ']'));
        if starts_code {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Parse `source[range]` on its own. Everything outside the range is blanked
/// so node positions still index into the full source.
pub(super) fn reparse_range(language: &Language, source: &str, range: Range<usize>) -> Option<Tree> {
    let mut bytes = source.as_bytes().to_vec();
    for (i, byte) in bytes.iter_mut().enumerate() {
        if !range.contains(&i) && *byte != b'\n' {
            *byte = b' ';
        }
    }
    let blanked = String::from_utf8(bytes).ok()?;

    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    parser.parse(&blanked, None)
}

/// Tree holding whatever follows the recovery point of a malformed type
pub(super) fn salvage(language: &Language, view: &SourceView, node: Node) -> Option<Tree> {
    let start = recovery_offset(view.source, node)?;
    reparse_range(language, view.source, start..node.end_byte())
}

pub(super) fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    children(node).into_iter().find_map(first_error)
}

/// Make sure a tree with errors yields at least one malformed token
pub(super) fn ensure_reported(tokens: &mut TokenStream, view: &SourceView, root: Node) {
    if !root.has_error() || tokens.has_malformed() {
        return;
    }
    match first_error(root) {
        Some(node) => report(tokens, view, node),
        None => tokens.malformed(view.span(root), "syntax error"),
    }
}

/// Visibility implied by a leading-underscore naming convention
pub(super) fn conventional_visibility(name: &str) -> crate::core::model::Visibility {
    use crate::core::model::Visibility;

    if name.starts_with("__") && name.ends_with("__") && name.len() > 4 {
        Visibility::Public
    } else if name.starts_with("__") || name.starts_with('#') {
        Visibility::Private
    } else if name.starts_with('_') {
        Visibility::Protected
    } else {
        Visibility::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::languages::lexical::PYTHON_SYNTAX;
    use crate::core::model::Visibility;

    #[test]
    fn test_conventional_visibility() {
        assert_eq!(conventional_visibility("__init__"), Visibility::Public);
        assert_eq!(conventional_visibility("__secret"), Visibility::Private);
        assert_eq!(conventional_visibility("#field"), Visibility::Private);
        assert_eq!(conventional_visibility("_helper"), Visibility::Protected);
        assert_eq!(conventional_visibility("run"), Visibility::Public);
    }

    #[test]
    fn test_source_view_signature() {
        let view = SourceView::new("def  run(a,\n        b):\n    pass\n", &PYTHON_SYNTAX);
        assert_eq!(view.signature(0, 23), "def run(a, b):");
        assert_eq!(view.signature(0, 500), "def run(a, b): pass");
    }
}
