use std::collections::BTreeSet;
use std::path::Path;
use tree_sitter::{Node, Parser};

use crate::error::{CodeLensError, Result};
use super::lexical::{self, CallScanner, JAVASCRIPT_SYNTAX};
use super::tree_walk::{self, SourceView};
use super::{Capabilities, LanguageAdapter};
use crate::core::model::{
    Declaration, FunctionToken, ImportToken, LineSpan, MemberKind, MemberToken, RawToken,
    TokenStream, TypeKind, TypeToken, Visibility,
};

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "typeof", "instanceof", "void", "delete",
    "await", "yield", "super", "import", "with",
];

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function",
    "function_expression",
    "generator_function",
];

/// JavaScript-specific adapter using Tree-sitter
pub struct JavaScriptAdapter {
    parser: Parser,
    calls: CallScanner,
}

impl JavaScriptAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let javascript_language = tree_sitter_javascript::language();
        parser.set_language(&javascript_language)
            .map_err(|e| CodeLensError::Parser(format!("Failed to set JavaScript language: {}", e)))?;

        Ok(Self {
            parser,
            calls: CallScanner::new(CALL_KEYWORDS),
        })
    }
}

impl LanguageAdapter for JavaScriptAdapter {
    fn parse(&mut self, content: &str, _file_path: &Path) -> Result<Vec<RawToken>> {
        let tree = tree_walk::parse_tree(&mut self.parser, content, "JavaScript")?;
        let root = tree.root_node();
        let view = SourceView::new(content, &JAVASCRIPT_SYNTAX);
        let mut tokens = TokenStream::new();

        self.walk_statements(root, &view, &[], &mut tokens);
        tree_walk::ensure_reported(&mut tokens, &view, root);

        Ok(tokens.into_tokens())
    }

    fn extract_file_docs(&self, content: &str) -> Option<String> {
        let lines: Vec<&str> = content.lines().collect();
        lexical::leading_comment_block(&lines, &JAVASCRIPT_SYNTAX)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            types: true,
            members: true,
            calls: true,
        }
    }
}

impl JavaScriptAdapter {
    fn walk_statements(&self, node: Node, view: &SourceView, scope: &[String], tokens: &mut TokenStream) {
        for child in tree_walk::children(node) {
            if child.is_error() {
                tree_walk::report(tokens, view, child);
                self.walk_statements(child, view, scope, tokens);
                continue;
            }
            if child.is_missing() {
                tree_walk::report(tokens, view, child);
                continue;
            }

            let doc_row = child.start_position().row;
            match child.kind() {
                "import_statement" => {
                    if let Some(source) = child.child_by_field_name("source") {
                        let path = view.text(source).trim_matches(|c| c == '"' || c == '\'' || c == '`');
                        tokens.push(RawToken::Import(ImportToken {
                            path: path.to_string(),
                            line: doc_row + 1,
                        }));
                    }
                }
                "export_statement" => {
                    let exported = child
                        .child_by_field_name("declaration")
                        .or_else(|| child.child_by_field_name("value"));
                    if let Some(declaration) = exported {
                        self.declaration(declaration, doc_row, view, scope, tokens);
                    }
                }
                _ => self.declaration(child, doc_row, view, scope, tokens),
            }
        }
    }

    fn declaration(&self, node: Node, doc_row: usize, view: &SourceView, scope: &[String], tokens: &mut TokenStream) {
        match node.kind() {
            "class_declaration" | "class" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.class(node, view.text(name), doc_row, view, scope, tokens);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.function(node, view.text(name), node.start_byte(), doc_row, view, scope, tokens);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                for declarator in tree_walk::children(node)
                    .into_iter()
                    .filter(|c| c.kind() == "variable_declarator")
                {
                    let (Some(name), Some(value)) = (
                        declarator.child_by_field_name("name"),
                        declarator.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    if name.kind() != "identifier" {
                        continue;
                    }
                    let name = view.text(name);

                    if FUNCTION_VALUES.contains(&value.kind()) {
                        self.function(value, name, declarator.start_byte(), doc_row, view, scope, tokens);
                    } else if value.kind() == "class" {
                        self.class(value, name, doc_row, view, scope, tokens);
                    }
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn function(
        &self,
        node: Node,
        name: &str,
        signature_start: usize,
        doc_row: usize,
        view: &SourceView,
        scope: &[String],
        tokens: &mut TokenStream,
    ) {
        if node.has_error() {
            tree_walk::report_dropped(tokens, view, node, "function");
            return;
        }
        let body = node.child_by_field_name("body");
        let signature = view.signature(
            signature_start,
            body.map(|b| b.start_byte()).unwrap_or(node.end_byte()),
        );

        let index = tokens.push(RawToken::Function(FunctionToken {
            decl: Declaration::new(
                name,
                scope,
                LineSpan::new(doc_row + 1, node.end_position().row + 1),
                view.docs_at(doc_row),
            ),
            signature: Some(signature),
            is_async: tree_walk::has_token(node, "async"),
            has_body: body.is_some(),
        }));

        let Some(body) = body else { return };
        for (callee, line) in view.calls(&self.calls, body) {
            tokens.call(index, callee, line);
        }
        if body.kind() == "statement_block" {
            let mut inner = scope.to_vec();
            inner.push(name.to_string());
            self.walk_statements(body, view, &inner, tokens);
        }
    }

    fn class(&self, node: Node, name: &str, doc_row: usize, view: &SourceView, scope: &[String], tokens: &mut TokenStream) {
        let body = node.child_by_field_name("body");
        if tree_walk::malformed_type(node, body, &["method_definition"]) {
            tree_walk::report_dropped(tokens, view, node, "class");
            let language = tree_sitter_javascript::language();
            if let Some(tree) = tree_walk::salvage(&language, view, node) {
                self.walk_statements(tree.root_node(), view, scope, tokens);
            }
            return;
        }

        let bases = tree_walk::child_of_kind(node, &["class_heritage"])
            .and_then(|heritage| tree_walk::named_children(heritage).into_iter().next())
            .map(|base| vec![lexical::squash_whitespace(view.text(base))])
            .unwrap_or_default();

        let index = tokens.push(RawToken::Type(TypeToken {
            decl: Declaration::new(
                name,
                scope,
                LineSpan::new(doc_row + 1, node.end_position().row + 1),
                view.docs_at(doc_row),
            ),
            type_kind: TypeKind::Class,
            visibility: Visibility::Public,
            bases,
        }));

        let Some(body) = body else {
            return;
        };
        let mut inner = scope.to_vec();
        inner.push(name.to_string());
        let mut declared = BTreeSet::new();
        self.class_body(body, index, view, &inner, &mut declared, tokens);
    }

    fn class_body(
        &self,
        body: Node,
        owner: usize,
        view: &SourceView,
        scope: &[String],
        declared: &mut BTreeSet<String>,
        tokens: &mut TokenStream,
    ) {
        for member in tree_walk::children(body) {
            if member.is_error() {
                tree_walk::report(tokens, view, member);
                self.class_body(member, owner, view, scope, declared, tokens);
                continue;
            }
            if member.is_missing() {
                tree_walk::report(tokens, view, member);
                continue;
            }

            match member.kind() {
                "method_definition" => self.method(member, owner, view, scope, declared, tokens),
                "field_definition" | "public_field_definition" => {
                    if member.has_error() {
                        tree_walk::report_dropped(tokens, view, member, "field");
                        continue;
                    }
                    let property = member
                        .child_by_field_name("property")
                        .or_else(|| member.child_by_field_name("name"));
                    let Some(property) = property else { continue };
                    let name = view.text(property).to_string();
                    if !declared.insert(name.clone()) {
                        continue;
                    }
                    tokens.push(RawToken::Member(MemberToken {
                        decl: Declaration::new(
                            &name,
                            scope,
                            view.span(member),
                            view.docs_at(member.start_position().row),
                        ),
                        parent: Some(owner),
                        member_kind: MemberKind::Field,
                        visibility: tree_walk::conventional_visibility(&name),
                        value_type: None,
                        signature: None,
                        has_body: false,
                    }));
                }
                _ => {}
            }
        }
    }

    fn method(
        &self,
        node: Node,
        owner: usize,
        view: &SourceView,
        scope: &[String],
        declared: &mut BTreeSet<String>,
        tokens: &mut TokenStream,
    ) {
        if node.has_error() {
            tree_walk::report_dropped(tokens, view, node, "method");
            return;
        }
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = view.text(name_node).to_string();
        let is_accessor = tree_walk::has_token(node, "get") || tree_walk::has_token(node, "set");

        let member_kind = if name == "constructor" {
            MemberKind::Constructor
        } else if is_accessor {
            // a getter/setter pair documents one property
            if !declared.insert(name.clone()) {
                return;
            }
            MemberKind::Property
        } else {
            MemberKind::Method
        };

        let body = node.child_by_field_name("body");
        let start = tree_walk::children(node)
            .into_iter()
            .find(|c| c.kind() != "decorator" && !c.is_extra())
            .map(|c| c.start_byte())
            .unwrap_or(node.start_byte());
        let signature = view.signature(start, body.map(|b| b.start_byte()).unwrap_or(node.end_byte()));

        let index = tokens.push(RawToken::Member(MemberToken {
            decl: Declaration::new(
                &name,
                scope,
                view.span(node),
                view.docs_at(node.start_position().row),
            ),
            parent: Some(owner),
            member_kind,
            visibility: tree_walk::conventional_visibility(&name),
            value_type: None,
            signature: Some(signature),
            has_body: body.is_some(),
        }));

        let Some(body) = body else { return };
        for (callee, line) in view.calls(&self.calls, body) {
            tokens.call(index, callee, line);
        }

        if member_kind == MemberKind::Constructor {
            let mut assignments = Vec::new();
            collect_this_assignments(body, view, &mut assignments);
            for (field, line) in assignments {
                if !declared.insert(field.clone()) {
                    continue;
                }
                tokens.push(RawToken::Member(MemberToken {
                    decl: Declaration::new(&field, scope, LineSpan::line(line), None),
                    parent: Some(owner),
                    member_kind: MemberKind::Field,
                    visibility: tree_walk::conventional_visibility(&field),
                    value_type: None,
                    signature: None,
                    has_body: false,
                }));
            }
        }
    }
}

/// `this.x = ...` targets, skipping nested functions that rebind `this`
fn collect_this_assignments(node: Node, view: &SourceView, out: &mut Vec<(String, usize)>) {
    for child in tree_walk::named_children(node) {
        match child.kind() {
            "function" | "function_expression" | "function_declaration" | "generator_function"
            | "generator_function_declaration" | "class" | "class_declaration" => continue,
            "assignment_expression" => {
                if let Some(left) = child.child_by_field_name("left") {
                    if left.kind() == "member_expression" {
                        let object = left.child_by_field_name("object");
                        let property = left.child_by_field_name("property");
                        if let (Some(object), Some(property)) = (object, property) {
                            if object.kind() == "this" {
                                out.push((view.text(property).to_string(), child.start_position().row + 1));
                            }
                        }
                    }
                }
                if let Some(right) = child.child_by_field_name("right") {
                    collect_this_assignments(right, view, out);
                }
            }
            _ => collect_this_assignments(child, view, out),
        }
    }
}
