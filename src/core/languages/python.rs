use std::collections::BTreeSet;
use std::path::Path;
use tree_sitter::{Node, Parser};

use crate::error::{CodeLensError, Result};
use super::lexical::{self, CallScanner, PYTHON_SYNTAX};
use super::tree_walk::{self, SourceView};
use super::{Capabilities, LanguageAdapter};
use crate::core::model::{
    Declaration, FunctionToken, ImportToken, LineSpan, MemberKind, MemberToken, RawToken,
    TokenStream, TypeKind, TypeToken,
};

const CALL_KEYWORDS: &[&str] = &[
    "if", "elif", "while", "for", "return", "and", "or", "not", "in", "is", "lambda", "yield",
    "await", "assert", "del", "with", "except", "raise", "print",
];

/// Class body statements that drop themselves when malformed
const CLASS_MEMBERS: &[&str] = &["function_definition", "decorated_definition", "class_definition"];

/// Python-specific adapter using Tree-sitter
pub struct PythonAdapter {
    parser: Parser,
    calls: CallScanner,
}

/// Class whose body is being walked
struct ClassContext {
    index: usize,
    scope: Vec<String>,
    /// Attribute names already emitted for the class
    fields: BTreeSet<String>,
}

impl PythonAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let python_language = tree_sitter_python::language();
        parser.set_language(&python_language)
            .map_err(|e| CodeLensError::Parser(format!("Failed to set Python language: {}", e)))?;

        Ok(Self {
            parser,
            calls: CallScanner::new(CALL_KEYWORDS),
        })
    }
}

impl LanguageAdapter for PythonAdapter {
    fn parse(&mut self, content: &str, _file_path: &Path) -> Result<Vec<RawToken>> {
        let tree = tree_walk::parse_tree(&mut self.parser, content, "Python")?;
        let root = tree.root_node();
        let view = SourceView::new(content, &PYTHON_SYNTAX);
        let mut tokens = TokenStream::new();

        self.walk_block(root, &view, &[], None, &mut tokens);
        tree_walk::ensure_reported(&mut tokens, &view, root);

        Ok(tokens.into_tokens())
    }

    fn extract_file_docs(&self, content: &str) -> Option<String> {
        // Module docstring first, then a leading comment block
        let trimmed = content.trim_start();
        for quote in ["\"\"\"", "'''"] {
            if let Some(rest) = trimmed.strip_prefix(quote) {
                if let Some(end) = rest.find(quote) {
                    return clean_docstring(&rest[..end]);
                }
            }
        }

        let lines: Vec<&str> = content.lines().collect();
        lexical::leading_comment_block(&lines, &PYTHON_SYNTAX)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            types: true,
            members: true,
            calls: true,
        }
    }
}

impl PythonAdapter {
    /// Walk the statements of a module, class body or function body
    fn walk_block(
        &self,
        node: Node,
        view: &SourceView,
        scope: &[String],
        mut class: Option<&mut ClassContext>,
        tokens: &mut TokenStream,
    ) {
        for child in tree_walk::children(node) {
            if child.is_error() {
                tree_walk::report(tokens, view, child);
                self.walk_block(child, view, scope, class.as_deref_mut(), tokens);
                continue;
            }
            if child.is_missing() {
                tree_walk::report(tokens, view, child);
                continue;
            }

            let doc_row = child.start_position().row;
            match child.kind() {
                "class_definition" => self.class_definition(child, doc_row, view, scope, tokens),
                "function_definition" => {
                    self.function_definition(child, doc_row, view, scope, class.as_deref_mut(), tokens)
                }
                "decorated_definition" => {
                    let Some(definition) = child.child_by_field_name("definition") else { continue };
                    match definition.kind() {
                        "class_definition" => {
                            self.class_definition(definition, doc_row, view, scope, tokens)
                        }
                        "function_definition" => self.function_definition(
                            definition,
                            doc_row,
                            view,
                            scope,
                            class.as_deref_mut(),
                            tokens,
                        ),
                        _ => {}
                    }
                }
                "expression_statement" => {
                    if let Some(class) = class.as_deref_mut() {
                        self.class_attribute(child, view, class, tokens);
                    }
                }
                "import_statement" | "import_from_statement" => self.import(child, view, tokens),
                _ => {}
            }
        }
    }

    fn class_definition(
        &self,
        node: Node,
        doc_row: usize,
        view: &SourceView,
        scope: &[String],
        tokens: &mut TokenStream,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = view.text(name_node).to_string();

        let body = node.child_by_field_name("body");
        if tree_walk::malformed_type(node, body, CLASS_MEMBERS) {
            tree_walk::report_dropped(tokens, view, node, "class");
            let language = tree_sitter_python::language();
            if let Some(tree) = tree_walk::salvage(&language, view, node) {
                self.walk_block(tree.root_node(), view, scope, None, tokens);
            }
            return;
        }

        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| {
                tree_walk::named_children(args)
                    .into_iter()
                    .filter(|arg| {
                        !matches!(
                            arg.kind(),
                            "keyword_argument" | "list_splat" | "dictionary_splat" | "comment"
                        )
                    })
                    .map(|arg| lexical::squash_whitespace(view.text(arg)))
                    .collect()
            })
            .unwrap_or_default();

        let docs = body
            .and_then(|b| docstring(b, view))
            .or_else(|| view.docs_at(doc_row));

        let index = tokens.push(RawToken::Type(TypeToken {
            decl: Declaration::new(&name, scope, LineSpan::new(doc_row + 1, node.end_position().row + 1), docs),
            type_kind: TypeKind::Class,
            visibility: tree_walk::conventional_visibility(&name),
            bases,
        }));

        if let Some(body) = body {
            let mut inner = scope.to_vec();
            inner.push(name);
            let mut class = ClassContext {
                index,
                scope: inner.clone(),
                fields: BTreeSet::new(),
            };
            self.walk_block(body, view, &inner, Some(&mut class), tokens);
        }
    }

    fn function_definition(
        &self,
        node: Node,
        doc_row: usize,
        view: &SourceView,
        scope: &[String],
        class: Option<&mut ClassContext>,
        tokens: &mut TokenStream,
    ) {
        if node.has_error() {
            tree_walk::report_dropped(tokens, view, node, "function");
            return;
        }
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = view.text(name_node).to_string();
        let body = node.child_by_field_name("body");

        let docs = body
            .and_then(|b| docstring(b, view))
            .or_else(|| view.docs_at(doc_row));
        let signature = view
            .signature(node.start_byte(), body.map(|b| b.start_byte()).unwrap_or(node.end_byte()))
            .trim_end_matches(':')
            .trim_end()
            .to_string();
        let span = LineSpan::new(doc_row + 1, node.end_position().row + 1);

        let token = match &class {
            Some(class) => RawToken::Member(MemberToken {
                decl: Declaration::new(&name, scope, span, docs),
                parent: Some(class.index),
                member_kind: if name == "__init__" {
                    MemberKind::Constructor
                } else {
                    MemberKind::Method
                },
                visibility: tree_walk::conventional_visibility(&name),
                value_type: node
                    .child_by_field_name("return_type")
                    .map(|t| view.text(t).to_string()),
                signature: Some(signature),
                has_body: body.is_some(),
            }),
            None => RawToken::Function(FunctionToken {
                decl: Declaration::new(&name, scope, span, docs),
                signature: Some(signature),
                is_async: tree_walk::has_token(node, "async"),
                has_body: body.is_some(),
            }),
        };
        let index = tokens.push(token);

        let Some(body) = body else { return };
        for (callee, line) in view.calls(&self.calls, body) {
            tokens.call(index, callee, line);
        }

        if name == "__init__" {
            if let Some(class) = class {
                let mut assignments = Vec::new();
                collect_self_assignments(body, view, &mut assignments);
                for (attribute, line, annotation) in assignments {
                    if !class.fields.insert(attribute.clone()) {
                        continue;
                    }
                    tokens.push(RawToken::Member(MemberToken {
                        decl: Declaration::new(&attribute, &class.scope, LineSpan::line(line), None),
                        parent: Some(class.index),
                        member_kind: MemberKind::Field,
                        visibility: tree_walk::conventional_visibility(&attribute),
                        value_type: annotation,
                        signature: None,
                        has_body: false,
                    }));
                }
            }
        }

        // nested functions and classes live in the function's own scope
        let mut inner = scope.to_vec();
        inner.push(name);
        self.walk_block(body, view, &inner, None, tokens);
    }

    /// `NAME = value` or `NAME: type = value` directly in a class body
    fn class_attribute(&self, node: Node, view: &SourceView, class: &mut ClassContext, tokens: &mut TokenStream) {
        let Some(assignment) = tree_walk::child_of_kind(node, &["assignment"]) else {
            return;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = view.text(left).to_string();
        if !class.fields.insert(name.clone()) {
            return;
        }

        tokens.push(RawToken::Member(MemberToken {
            decl: Declaration::new(
                &name,
                &class.scope,
                view.span(node),
                view.docs_at(node.start_position().row),
            ),
            parent: Some(class.index),
            member_kind: MemberKind::Field,
            visibility: tree_walk::conventional_visibility(&name),
            value_type: assignment
                .child_by_field_name("type")
                .map(|t| view.text(t).to_string()),
            signature: None,
            has_body: false,
        }));
    }

    fn import(&self, node: Node, view: &SourceView, tokens: &mut TokenStream) {
        let line = node.start_position().row + 1;
        let mut push = |path: &str| {
            tokens.push(RawToken::Import(ImportToken {
                path: path.to_string(),
                line,
            }));
        };

        if node.kind() == "import_from_statement" {
            if let Some(module) = node.child_by_field_name("module_name") {
                push(view.text(module));
            }
            return;
        }

        for child in tree_walk::named_children(node) {
            match child.kind() {
                "dotted_name" => push(view.text(child)),
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        push(view.text(name));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Docstring of a class or function body
fn docstring(body: Node, view: &SourceView) -> Option<String> {
    let first = tree_walk::named_children(body)
        .into_iter()
        .find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = tree_walk::named_children(first).into_iter().next()?;
    if string.kind() != "string" {
        return None;
    }

    let text = view.text(string);
    let text = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let text = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| text.strip_prefix(q).and_then(|t| t.strip_suffix(q)))
        .unwrap_or(text);
    clean_docstring(text)
}

fn clean_docstring(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty())?;
    let end = lines.iter().rposition(|l| !l.is_empty())?;
    Some(lines[start..=end].join("\n"))
}

/// `self.x = ...` targets inside a constructor body, outside nested scopes
fn collect_self_assignments(node: Node, view: &SourceView, out: &mut Vec<(String, usize, Option<String>)>) {
    for child in tree_walk::named_children(node) {
        match child.kind() {
            "function_definition" | "class_definition" | "lambda" => continue,
            "assignment" | "augmented_assignment" => {
                if let Some(left) = child.child_by_field_name("left") {
                    let targets = if left.kind() == "pattern_list" || left.kind() == "tuple_pattern" {
                        tree_walk::named_children(left)
                    } else {
                        vec![left]
                    };
                    for target in targets {
                        if let Some(name) = self_attribute(target, view) {
                            let annotation = child
                                .child_by_field_name("type")
                                .map(|t| view.text(t).to_string());
                            out.push((name, child.start_position().row + 1, annotation));
                        }
                    }
                }
                if let Some(right) = child.child_by_field_name("right") {
                    collect_self_assignments(right, view, out);
                }
            }
            _ => collect_self_assignments(child, view, out),
        }
    }
}

fn self_attribute(node: Node, view: &SourceView) -> Option<String> {
    if node.kind() != "attribute" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    if view.text(object) != "self" {
        return None;
    }
    node.child_by_field_name("attribute")
        .map(|a| view.text(a).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Visibility;

    const PLAYER: &str = r#""""Player utilities."""
import os
from game.entities import Entity


class Player(Entity, metaclass=ABCMeta):
    """A player character."""

    MAX_HEALTH: int = 100

    def __init__(self, name):
        self.name = name
        self._health = self.MAX_HEALTH
        self.reset()

    @property
    def health(self):
        return self._health

    async def __respawn(self):
        await self.reset()

    def reset(self):
        def clamp(v):
            return max(0, v)
        # reset health via clamp(limit)
        self._health = clamp(self.MAX_HEALTH)


def main():
    Player("a").reset()
"#;

    fn parse(source: &str) -> Vec<RawToken> {
        PythonAdapter::new().unwrap().parse(source, Path::new("player.py")).unwrap()
    }

    fn members(tokens: &[RawToken]) -> Vec<&MemberToken> {
        tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Member(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_class_structure() {
        let tokens = parse(PLAYER);

        let player = tokens.iter().find_map(|t| match t {
            RawToken::Type(t) => Some(t),
            _ => None,
        });
        let player = player.expect("class token");
        assert_eq!(player.decl.name, "Player");
        assert_eq!(player.bases, vec!["Entity".to_string()]);
        assert_eq!(player.decl.docs.as_deref(), Some("A player character."));

        let members = members(&tokens);
        let names: Vec<&str> = members.iter().map(|m| m.decl.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["MAX_HEALTH", "__init__", "name", "_health", "health", "__respawn", "reset"]
        );

        assert_eq!(members[0].value_type.as_deref(), Some("int"));
        assert_eq!(members[1].member_kind, MemberKind::Constructor);
        assert_eq!(members[2].member_kind, MemberKind::Field);
        assert_eq!(members[3].visibility, Visibility::Protected);
        assert_eq!(members[4].member_kind, MemberKind::Method);
        assert_eq!(members[5].visibility, Visibility::Private);
        assert_eq!(members[5].signature.as_deref(), Some("async def __respawn(self)"));
        assert!(members.iter().all(|m| m.decl.scope == vec!["Player".to_string()]));
    }

    #[test]
    fn test_functions_and_nested_scope() {
        let tokens = parse(PLAYER);

        let functions: Vec<String> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Function(f) => Some(f.decl.qualified_name()),
                _ => None,
            })
            .collect();
        assert_eq!(functions, vec!["Player.reset.clamp", "main"]);
    }

    #[test]
    fn test_calls() {
        let tokens = parse(PLAYER);
        let calls: Vec<(String, &str)> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Call(c) => {
                    let caller = tokens[c.caller].declaration()?.qualified_name();
                    Some((caller, c.callee.as_str()))
                }
                _ => None,
            })
            .collect();

        assert!(calls.contains(&("Player.__init__".to_string(), "reset")));
        assert!(calls.contains(&("Player.__respawn".to_string(), "reset")));
        assert!(calls.contains(&("Player.reset".to_string(), "clamp")));
        assert!(calls.contains(&("Player.reset.clamp".to_string(), "max")));
        assert!(calls.contains(&("main".to_string(), "Player")));
        assert!(calls.contains(&("main".to_string(), "reset")));
        // declarations are not calls
        assert!(!calls.iter().any(|(_, callee)| *callee == "__init__"));
        assert_eq!(calls.iter().filter(|(caller, _)| caller == "Player.reset").count(), 2);
    }

    #[test]
    fn test_imports_and_file_docs() {
        let tokens = parse(PLAYER);
        let imports: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Import(i) => Some(i.path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(imports, vec!["os", "game.entities"]);

        let adapter = PythonAdapter::new().unwrap();
        assert_eq!(adapter.extract_file_docs(PLAYER).as_deref(), Some("Player utilities."));
        assert_eq!(
            adapter.extract_file_docs("# Helpers.\nimport os\n").as_deref(),
            Some("Helpers.")
        );
    }

    #[test]
    fn test_syntax_errors_become_malformed_tokens() {
        let tokens = parse("def ok():\n    pass\n\ndef broken(:\n    pass\n\nclass Fine:\n    pass\n");
        assert!(tokens.iter().any(|t| matches!(t, RawToken::Malformed(_))));
    }
}
