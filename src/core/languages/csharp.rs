use std::path::Path;
use tree_sitter::{Node, Parser};

use crate::error::{CodeLensError, Result};
use super::lexical::{self, CallScanner, CSHARP_SYNTAX};
use super::tree_walk::{self, SourceView};
use super::{Capabilities, LanguageAdapter};
use crate::core::model::{
    Declaration, ImportToken, MemberKind, MemberToken, RawToken, TokenStream, TypeKind,
    TypeToken, Visibility,
};

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "using", "lock", "return", "nameof",
    "typeof", "sizeof", "default", "checked", "unchecked", "fixed", "when", "base", "this",
    "stackalloc",
];

/// Type body declarations that drop themselves when malformed
const TYPE_MEMBERS: &[&str] = &[
    "method_declaration",
    "constructor_declaration",
    "property_declaration",
    "field_declaration",
    "event_field_declaration",
    "event_declaration",
    "enum_member_declaration",
    "class_declaration",
    "struct_declaration",
    "interface_declaration",
    "record_declaration",
    "record_struct_declaration",
    "destructor_declaration",
    "indexer_declaration",
    "operator_declaration",
    "conversion_operator_declaration",
    "delegate_declaration",
    "enum_declaration",
];

/// C#-specific adapter using Tree-sitter
pub struct CSharpAdapter {
    parser: Parser,
    calls: CallScanner,
}

/// The type whose body is being walked
struct Owner {
    index: usize,
    type_kind: TypeKind,
}

impl CSharpAdapter {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let csharp_language = tree_sitter_c_sharp::language();
        parser.set_language(&csharp_language)
            .map_err(|e| CodeLensError::Parser(format!("Failed to set C# language: {}", e)))?;

        Ok(Self {
            parser,
            calls: CallScanner::new(CALL_KEYWORDS),
        })
    }
}

impl LanguageAdapter for CSharpAdapter {
    fn parse(&mut self, content: &str, _file_path: &Path) -> Result<Vec<RawToken>> {
        let tree = tree_walk::parse_tree(&mut self.parser, content, "C#")?;
        let root = tree.root_node();
        let view = SourceView::new(content, &CSHARP_SYNTAX);
        let mut tokens = TokenStream::new();

        self.walk_declarations(root, &view, &[], None, &mut tokens);
        tree_walk::ensure_reported(&mut tokens, &view, root);

        Ok(tokens.into_tokens())
    }

    fn extract_file_docs(&self, content: &str) -> Option<String> {
        let lines: Vec<&str> = content.lines().collect();
        lexical::leading_comment_block(&lines, &CSHARP_SYNTAX)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            types: true,
            members: true,
            calls: true,
        }
    }
}

impl CSharpAdapter {
    /// Walk the declarations of a compilation unit, namespace or type body
    fn walk_declarations(
        &self,
        node: Node,
        view: &SourceView,
        scope: &[String],
        owner: Option<&Owner>,
        tokens: &mut TokenStream,
    ) {
        // file-scoped namespaces apply to everything after them
        let mut scope = scope.to_vec();

        for child in tree_walk::children(node) {
            if child.is_error() {
                tree_walk::report(tokens, view, child);
                self.walk_declarations(child, view, &scope, owner, tokens);
                continue;
            }
            if child.is_missing() {
                tree_walk::report(tokens, view, child);
                continue;
            }

            match child.kind() {
                "using_directive" => {
                    if let Some(path) = using_path(view.text(child)) {
                        tokens.push(RawToken::Import(ImportToken {
                            path,
                            line: child.start_position().row + 1,
                        }));
                    }
                }
                "namespace_declaration" => {
                    let mut inner = scope.clone();
                    if let Some(name) = child.child_by_field_name("name") {
                        inner.extend(split_dotted(view.text(name)));
                    }
                    if let Some(body) = child.child_by_field_name("body") {
                        self.walk_declarations(body, view, &inner, None, tokens);
                    }
                }
                "file_scoped_namespace_declaration" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        scope.extend(split_dotted(view.text(name)));
                    }
                    self.walk_declarations(child, view, &scope, None, tokens);
                }
                "class_declaration" | "struct_declaration" | "interface_declaration"
                | "record_declaration" | "record_struct_declaration" | "enum_declaration" => {
                    self.type_declaration(child, view, &scope, owner, tokens);
                }
                "declaration_list" => self.walk_declarations(child, view, &scope, owner, tokens),
                "method_declaration" | "constructor_declaration" | "property_declaration"
                | "field_declaration" | "event_field_declaration" | "event_declaration"
                | "enum_member_declaration" => {
                    if let Some(owner) = owner {
                        self.member(child, view, &scope, owner, tokens);
                    }
                }
                _ => {}
            }
        }
    }

    fn type_declaration(
        &self,
        node: Node,
        view: &SourceView,
        scope: &[String],
        owner: Option<&Owner>,
        tokens: &mut TokenStream,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = view.text(name_node).to_string();

        let body = node.child_by_field_name("body");
        if tree_walk::malformed_type(node, body, TYPE_MEMBERS) {
            tree_walk::report_dropped(tokens, view, node, "type");
            let language = tree_sitter_c_sharp::language();
            if let Some(tree) = tree_walk::salvage(&language, view, node) {
                self.walk_declarations(tree.root_node(), view, scope, owner, tokens);
            }
            return;
        }

        let type_kind = match node.kind() {
            "struct_declaration" | "record_struct_declaration" => TypeKind::Struct,
            "interface_declaration" => TypeKind::Interface,
            "record_declaration" => TypeKind::Record,
            "enum_declaration" => TypeKind::Enum,
            _ => TypeKind::Class,
        };

        let default_visibility = if owner.is_some() {
            Visibility::Private
        } else {
            Visibility::Internal
        };

        let bases = tree_walk::child_of_kind(node, &["base_list"])
            .map(|list| {
                tree_walk::named_children(list)
                    .into_iter()
                    .filter(|n| !n.is_extra())
                    .map(|n| {
                        let text = view.text(n);
                        // record primary constructor arguments are not part of the base name
                        let text = match (n.kind(), text.find('(')) {
                            ("primary_constructor_base_type", Some(paren)) => &text[..paren],
                            _ => text,
                        };
                        lexical::squash_whitespace(text)
                    })
                    .filter(|b| !b.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let index = tokens.push(RawToken::Type(TypeToken {
            decl: Declaration::new(
                &name,
                scope,
                view.span(node),
                view.docs_at(node.start_position().row),
            ),
            type_kind,
            visibility: visibility_of(node, view, default_visibility),
            bases,
        }));

        if let Some(body) = body {
            let mut inner = scope.to_vec();
            inner.push(name);
            let owner = Owner { index, type_kind };
            self.walk_declarations(body, view, &inner, Some(&owner), tokens);
        }
    }

    fn member(&self, node: Node, view: &SourceView, scope: &[String], owner: &Owner, tokens: &mut TokenStream) {
        if node.has_error() {
            tree_walk::report_dropped(tokens, view, node, "member");
            return;
        }

        let default_visibility = match owner.type_kind {
            TypeKind::Interface | TypeKind::Enum => Visibility::Public,
            _ => Visibility::Private,
        };
        let visibility = visibility_of(node, view, default_visibility);
        let docs = view.docs_at(node.start_position().row);
        let span = view.span(node);
        let type_text = |field: &str| node.child_by_field_name(field).map(|t| view.text(t).to_string());

        let member = |name: &str, member_kind, value_type, signature, has_body| MemberToken {
            decl: Declaration::new(name, scope, span, docs.clone()),
            parent: Some(owner.index),
            member_kind,
            visibility,
            value_type,
            signature,
            has_body,
        };

        match node.kind() {
            "method_declaration" | "constructor_declaration" => {
                let Some(name) = node.child_by_field_name("name") else { return };
                let body = node
                    .child_by_field_name("body")
                    .or_else(|| tree_walk::child_of_kind(node, &["arrow_expression_clause"]));

                let (member_kind, value_type) = if node.kind() == "constructor_declaration" {
                    (MemberKind::Constructor, None)
                } else {
                    (MemberKind::Method, type_text("returns").or_else(|| type_text("type")))
                };
                let end = body.map(|b| b.start_byte()).unwrap_or(node.end_byte());
                let signature = view
                    .signature(signature_start(node), end)
                    .trim_end_matches(';')
                    .trim_end()
                    .to_string();

                let index = tokens.push(RawToken::Member(member(
                    view.text(name),
                    member_kind,
                    value_type,
                    Some(signature),
                    body.is_some(),
                )));
                if let Some(body) = body {
                    for (callee, line) in view.calls(&self.calls, body) {
                        tokens.call(index, callee, line);
                    }
                }
            }
            "property_declaration" | "event_declaration" => {
                let Some(name) = node.child_by_field_name("name") else { return };
                let member_kind = if node.kind() == "event_declaration" {
                    MemberKind::Event
                } else {
                    MemberKind::Property
                };
                tokens.push(RawToken::Member(member(
                    view.text(name),
                    member_kind,
                    type_text("type"),
                    None,
                    false,
                )));
            }
            "field_declaration" | "event_field_declaration" => {
                let Some(declaration) = tree_walk::child_of_kind(node, &["variable_declaration"]) else {
                    return;
                };
                let value_type = declaration
                    .child_by_field_name("type")
                    .map(|t| view.text(t).to_string());
                let member_kind = if node.kind() == "event_field_declaration" {
                    MemberKind::Event
                } else {
                    MemberKind::Field
                };

                for declarator in tree_walk::children(declaration)
                    .into_iter()
                    .filter(|c| c.kind() == "variable_declarator")
                {
                    let name = declarator
                        .child_by_field_name("name")
                        .or_else(|| tree_walk::child_of_kind(declarator, &["identifier"]));
                    if let Some(name) = name {
                        tokens.push(RawToken::Member(member(
                            view.text(name),
                            member_kind,
                            value_type.clone(),
                            None,
                            false,
                        )));
                    }
                }
            }
            "enum_member_declaration" => {
                let name = node
                    .child_by_field_name("name")
                    .or_else(|| tree_walk::child_of_kind(node, &["identifier"]));
                if let Some(name) = name {
                    tokens.push(RawToken::Member(member(
                        view.text(name),
                        MemberKind::EnumValue,
                        None,
                        None,
                        false,
                    )));
                }
            }
            _ => {}
        }
    }
}

/// Parse C# visibility modifiers
fn visibility_of(node: Node, view: &SourceView, default: Visibility) -> Visibility {
    let modifiers: Vec<&str> = tree_walk::children(node)
        .into_iter()
        .filter(|c| c.kind() == "modifier" || c.kind() == "modifiers")
        .map(|c| view.text(c))
        .collect();
    let modifiers_text = modifiers.join(" ");

    let has = |word: &str| modifiers_text.split_whitespace().any(|w| w == word);
    if has("public") {
        Visibility::Public
    } else if has("private") {
        Visibility::Private
    } else if has("protected") {
        Visibility::Protected
    } else if has("internal") {
        Visibility::Internal
    } else {
        default
    }
}

/// Skip leading attribute lists so signatures start at the modifiers
fn signature_start(node: Node) -> usize {
    tree_walk::children(node)
        .into_iter()
        .find(|c| c.kind() != "attribute_list" && !c.is_extra())
        .map(|c| c.start_byte())
        .unwrap_or(node.start_byte())
}

fn using_path(text: &str) -> Option<String> {
    let body = text.trim().trim_end_matches(';');
    let mut words: Vec<&str> = body.split_whitespace().collect();
    words.retain(|w| !matches!(*w, "global" | "using" | "static"));
    let joined = words.join(" ");
    let path = match joined.split_once('=') {
        Some((_, target)) => target.trim().to_string(),
        None => joined,
    };
    (!path.is_empty()).then_some(path)
}

fn split_dotted(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYER: &str = r#"using System;
using UnityEngine;
using Vec = UnityEngine.Vector3;

namespace Game.Core
{
    /// <summary>
    /// Base interface for damageable things.
    /// </summary>
    public interface IDamageable
    {
        void TakeDamage(int amount);
    }

    public class Player : Entity, IDamageable
    {
        [SerializeField] private int health = 100;
        public string Name { get; set; }
        public event Action Died;

        public Player(string name) { Name = name; Reset(); }

        /// Applies damage.
        public void TakeDamage(int amount)
        {
            health -= amount;
            // Log("ignored") in a comment
            if (health <= 0) Die();
        }

        private void Die() => Died?.Invoke();

        public enum State { Idle, Running }
    }
}
"#;

    fn parse(source: &str) -> Vec<RawToken> {
        CSharpAdapter::new().unwrap().parse(source, Path::new("Player.cs")).unwrap()
    }

    fn names(tokens: &[RawToken]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| t.declaration().map(|d| d.qualified_name()))
            .collect()
    }

    #[test]
    fn test_types_and_members() {
        let tokens = parse(PLAYER);

        assert_eq!(
            names(&tokens),
            vec![
                "Game.Core.IDamageable",
                "Game.Core.IDamageable.TakeDamage",
                "Game.Core.Player",
                "Game.Core.Player.health",
                "Game.Core.Player.Name",
                "Game.Core.Player.Died",
                "Game.Core.Player.Player",
                "Game.Core.Player.TakeDamage",
                "Game.Core.Player.Die",
                "Game.Core.Player.State",
                "Game.Core.Player.State.Idle",
                "Game.Core.Player.State.Running",
            ]
        );

        let types: Vec<&TypeToken> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Type(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(types[0].type_kind, TypeKind::Interface);
        assert_eq!(types[0].decl.docs.as_deref(), Some("Base interface for damageable things."));
        assert_eq!(types[1].bases, vec!["Entity".to_string(), "IDamageable".to_string()]);
        assert_eq!(types[1].visibility, Visibility::Public);
        assert_eq!(types[2].type_kind, TypeKind::Enum);
    }

    #[test]
    fn test_member_details() {
        let tokens = parse(PLAYER);
        let members: Vec<&MemberToken> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Member(m) => Some(m),
                _ => None,
            })
            .collect();

        let interface_method = members[0];
        assert_eq!(interface_method.visibility, Visibility::Public);
        assert!(!interface_method.has_body);

        let health = members[1];
        assert_eq!(health.member_kind, MemberKind::Field);
        assert_eq!(health.visibility, Visibility::Private);
        assert_eq!(health.value_type.as_deref(), Some("int"));

        assert_eq!(members[2].member_kind, MemberKind::Property);
        assert_eq!(members[2].value_type.as_deref(), Some("string"));
        assert_eq!(members[3].member_kind, MemberKind::Event);
        assert_eq!(members[4].member_kind, MemberKind::Constructor);

        let take_damage = members[5];
        assert_eq!(take_damage.decl.docs.as_deref(), Some("Applies damage."));
        assert_eq!(take_damage.signature.as_deref(), Some("public void TakeDamage(int amount)"));
        assert_eq!(take_damage.value_type.as_deref(), Some("void"));

        let die = members[6];
        assert_eq!(die.visibility, Visibility::Private);
        assert!(die.has_body);
    }

    #[test]
    fn test_calls_and_imports() {
        let tokens = parse(PLAYER);

        let calls: Vec<(&str, &str)> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Call(c) => {
                    let caller = tokens[c.caller].declaration().map(|d| d.name.as_str())?;
                    Some((caller, c.callee.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![("Player", "Reset"), ("TakeDamage", "Die"), ("Die", "Invoke")]
        );

        let imports: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Import(i) => Some(i.path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(imports, vec!["System", "UnityEngine", "UnityEngine.Vector3"]);
    }

    #[test]
    fn test_file_scoped_namespace() {
        let tokens = parse("namespace Game.Ui;\n\npublic class Hud { void Draw() {} }\n");
        assert_eq!(names(&tokens), vec!["Game.Ui.Hud", "Game.Ui.Hud.Draw"]);
    }

    #[test]
    fn test_syntax_errors_become_malformed_tokens() {
        let source = "public class Broken {\n    public void Ok() {}\n    public void Bad( {\n}\n";
        let tokens = parse(source);
        assert!(tokens.iter().any(|t| matches!(t, RawToken::Malformed(_))));
    }

    #[test]
    fn test_using_path() {
        assert_eq!(using_path("using static System.Math;").as_deref(), Some("System.Math"));
        assert_eq!(using_path("global using System;").as_deref(), Some("System"));
        assert_eq!(using_path("using;"), None);
    }
}
