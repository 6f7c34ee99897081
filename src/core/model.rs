//! Language-agnostic structural model shared by every pipeline stage.
//!
//! Adapters produce [`SourceUnit`]s made of [`RawToken`]s; the builder turns
//! those into [`Entity`] values and the resolver adds [`RelationshipEdge`]s.
//! Once an [`EntityGraph`] is assembled nothing in it changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::diagnostics::{Diagnostic, DiagnosticKind};

/// Separator used when joining scope segments into a qualified name
pub const SCOPE_SEPARATOR: &str = ".";

/// Supported source languages, one grammar adapter each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    CSharp,
    Shader,
    Cpp,
    Python,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::CSharp,
        Language::Shader,
        Language::Cpp,
        Language::Python,
        Language::JavaScript,
    ];

    /// Configuration name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Language::CSharp => "csharp",
            Language::Shader => "shader",
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }

    /// Human readable name used in generated documents
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::CSharp => "C#",
            Language::Shader => "Shader",
            Language::Cpp => "C++",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
        }
    }

    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::CSharp => &["cs"],
            Language::Shader => &["shader", "cginc", "hlsl", "compute"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "h"],
            Language::Python => &["py"],
            Language::JavaScript => &["js", "mjs", "cjs", "jsx"],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csharp" | "c#" | "cs" => Some(Language::CSharp),
            "shader" | "shaderlab" | "hlsl" => Some(Language::Shader),
            "cpp" | "c++" => Some(Language::Cpp),
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" => Some(Language::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Inclusive, 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn line(line: usize) -> Self {
        Self::new(line, line)
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Internal,
    Private,
}

impl Visibility {
    /// Marker used by class diagrams
    pub fn symbol(&self) -> &'static str {
        match self {
            Visibility::Public => "+",
            Visibility::Protected => "#",
            Visibility::Internal => "~",
            Visibility::Private => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Enum,
    Record,
    Union,
    Shader,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Record => "record",
            TypeKind::Union => "union",
            TypeKind::Shader => "shader",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Field,
    Property,
    Method,
    Constructor,
    EnumValue,
    Event,
}

impl MemberKind {
    /// Whether call sites may target this member
    pub fn is_callable(&self) -> bool {
        matches!(self, MemberKind::Method | MemberKind::Constructor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Field => "field",
            MemberKind::Property => "property",
            MemberKind::Method => "method",
            MemberKind::Constructor => "constructor",
            MemberKind::EnumValue => "enum value",
            MemberKind::Event => "event",
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter output
// ---------------------------------------------------------------------------

/// Raw text of one file handed to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub path: PathBuf,
    pub text: String,
    pub language_hint: Option<Language>,
}

impl SourceText {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            language_hint: None,
        }
    }

    pub fn with_hint(mut self, language: Language) -> Self {
        self.language_hint = Some(language);
        self
    }
}

/// Common header of every declaration token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// Enclosing scope names, outermost first
    pub scope: Vec<String>,
    pub span: LineSpan,
    pub docs: Option<String>,
}

impl Declaration {
    pub fn new(name: impl Into<String>, scope: &[String], span: LineSpan, docs: Option<String>) -> Self {
        Self {
            name: name.into(),
            scope: scope.to_vec(),
            span,
            docs,
        }
    }

    pub fn qualified_name(&self) -> String {
        qualify(&self.scope, &self.name)
    }

    /// Scope of anything declared inside this declaration
    pub fn inner_scope(&self) -> Vec<String> {
        let mut scope = self.scope.clone();
        scope.push(self.name.clone());
        scope
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeToken {
    pub decl: Declaration,
    pub type_kind: TypeKind,
    pub visibility: Visibility,
    pub bases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberToken {
    pub decl: Declaration,
    /// Index of the enclosing type token within the same unit
    pub parent: Option<usize>,
    pub member_kind: MemberKind,
    pub visibility: Visibility,
    pub value_type: Option<String>,
    pub signature: Option<String>,
    pub has_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionToken {
    pub decl: Declaration,
    pub signature: Option<String>,
    pub is_async: bool,
    pub has_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToken {
    /// Index of the calling member/function token within the same unit
    pub caller: usize,
    pub callee: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPropertyToken {
    pub decl: Declaration,
    pub parent: Option<usize>,
    pub display_name: String,
    pub property_type: String,
    pub default_value: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderPassToken {
    pub decl: Declaration,
    pub parent: Option<usize>,
    pub vertex_stage: Option<String>,
    pub fragment_stage: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportToken {
    pub path: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedToken {
    pub span: LineSpan,
    pub message: String,
}

/// One structural token produced by a grammar adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "token", rename_all = "snake_case")]
pub enum RawToken {
    Type(TypeToken),
    Member(MemberToken),
    Function(FunctionToken),
    Call(CallToken),
    ShaderProperty(ShaderPropertyToken),
    ShaderPass(ShaderPassToken),
    Import(ImportToken),
    Malformed(MalformedToken),
}

impl RawToken {
    pub fn declaration(&self) -> Option<&Declaration> {
        match self {
            RawToken::Type(t) => Some(&t.decl),
            RawToken::Member(m) => Some(&m.decl),
            RawToken::Function(f) => Some(&f.decl),
            RawToken::ShaderProperty(p) => Some(&p.decl),
            RawToken::ShaderPass(p) => Some(&p.decl),
            RawToken::Call(_) | RawToken::Import(_) | RawToken::Malformed(_) => None,
        }
    }
}

/// Append-only token list that hands out the index of each pushed token
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: Vec<RawToken>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: RawToken) -> usize {
        self.tokens.push(token);
        self.tokens.len() - 1
    }

    pub fn call(&mut self, caller: usize, callee: impl Into<String>, line: usize) {
        self.push(RawToken::Call(CallToken {
            caller,
            callee: callee.into(),
            line,
        }));
    }

    pub fn malformed(&mut self, span: LineSpan, message: impl Into<String>) {
        self.push(RawToken::Malformed(MalformedToken {
            span,
            message: message.into(),
        }));
    }

    pub fn has_malformed(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, RawToken::Malformed(_)))
    }

    pub fn into_tokens(self) -> Vec<RawToken> {
        self.tokens
    }
}

/// One parsed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub language: Language,
    pub content_hash: String,
    pub line_count: usize,
    pub file_docs: Option<String>,
    pub tokens: Vec<RawToken>,
}

impl SourceUnit {
    pub fn imports(&self) -> Vec<String> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                RawToken::Import(import) => Some(import.path.clone()),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Type,
    Member,
    Function,
    ShaderProperty,
    ShaderPass,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Type => "Type",
            EntityKind::Member => "Member",
            EntityKind::Function => "Function",
            EntityKind::ShaderProperty => "ShaderProperty",
            EntityKind::ShaderPass => "ShaderPass",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable entity identifier: `<Kind>::<qualified name>` plus an optional
/// `#n` suffix for duplicate declarations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(kind: EntityKind, qualified_name: &str) -> Self {
        Self(format!("{}::{}", kind.as_str(), qualified_name))
    }

    pub fn with_occurrence(&self, occurrence: usize) -> Self {
        if occurrence <= 1 {
            self.clone()
        } else {
            Self(format!("{}#{}", self.0, occurrence))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub lines: LineSpan,
}

/// Lexical call site recorded on a callable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub callee: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetail {
    Type {
        type_kind: TypeKind,
        visibility: Visibility,
        bases: Vec<String>,
    },
    Member {
        member_kind: MemberKind,
        visibility: Visibility,
        value_type: Option<String>,
        signature: Option<String>,
        owner: Option<EntityId>,
    },
    Function {
        signature: Option<String>,
        is_async: bool,
    },
    ShaderProperty {
        display_name: String,
        property_type: String,
        default_value: String,
        attributes: Vec<String>,
        owner: Option<EntityId>,
    },
    ShaderPass {
        vertex_stage: Option<String>,
        fragment_stage: Option<String>,
        tags: BTreeMap<String, String>,
        owner: Option<EntityId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub qualified_name: String,
    pub scope: Vec<String>,
    pub language: Language,
    pub location: SourceLocation,
    pub docs: Option<String>,
    /// 1 for the first declaration of an identifier, 2+ for duplicates
    pub occurrence: usize,
    pub detail: EntityDetail,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_sites: Vec<CallSite>,
}

impl Entity {
    /// Owning entity for nested members, properties and passes
    pub fn owner(&self) -> Option<&EntityId> {
        match &self.detail {
            EntityDetail::Member { owner, .. }
            | EntityDetail::ShaderProperty { owner, .. }
            | EntityDetail::ShaderPass { owner, .. } => owner.as_ref(),
            EntityDetail::Type { .. } | EntityDetail::Function { .. } => None,
        }
    }

    /// Functions and methods/constructors can be call targets
    pub fn is_callable(&self) -> bool {
        match &self.detail {
            EntityDetail::Function { .. } => true,
            EntityDetail::Member { member_kind, .. } => member_kind.is_callable(),
            _ => false,
        }
    }

    pub fn type_kind(&self) -> Option<TypeKind> {
        match &self.detail {
            EntityDetail::Type { type_kind, .. } => Some(*type_kind),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match &self.detail {
            EntityDetail::Member { signature, .. } | EntityDetail::Function { signature, .. } => {
                signature.as_deref()
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Relationships and the assembled graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Inherits,
    Implements,
    Calls,
    Uses,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EdgeKind,
}

impl RelationshipEdge {
    pub fn new(source: EntityId, target: EntityId, kind: EdgeKind) -> Self {
        Self { source, target, kind }
    }
}

/// Per-file facts that are not entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub language: Language,
    pub content_hash: String,
    pub line_count: usize,
    pub file_docs: Option<String>,
    pub imports: Vec<String>,
}

impl From<&SourceUnit> for FileSummary {
    fn from(unit: &SourceUnit) -> Self {
        Self {
            path: unit.path.clone(),
            language: unit.language,
            content_hash: unit.content_hash.clone(),
            line_count: unit.line_count,
            file_docs: unit.file_docs.clone(),
            imports: unit.imports(),
        }
    }
}

/// Entities and relationships of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGraph {
    files: Vec<FileSummary>,
    entities: Vec<Entity>,
    edges: Vec<RelationshipEdge>,
}

impl EntityGraph {
    /// Assemble a graph, sorting everything and dropping edges whose
    /// endpoints are not part of the entity set
    pub fn new(
        mut files: Vec<FileSummary>,
        mut entities: Vec<Entity>,
        edges: impl IntoIterator<Item = RelationshipEdge>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        entities.sort_by(|a, b| a.id.cmp(&b.id));

        let known: BTreeSet<&EntityId> = entities.iter().map(|e| &e.id).collect();
        let mut kept = BTreeSet::new();
        for edge in edges {
            if known.contains(&edge.source) && known.contains(&edge.target) {
                kept.insert(edge);
            } else {
                let message = format!(
                    "{:?} edge {} -> {} references an unknown entity",
                    edge.kind, edge.source, edge.target
                );
                diagnostics.push(
                    Diagnostic::new(DiagnosticKind::UnresolvedReference, message)
                        .with_subject(edge.source.clone()),
                );
            }
        }

        Self {
            files,
            entities,
            edges: kept.into_iter().collect(),
        }
    }

    pub fn files(&self) -> &[FileSummary] {
        &self.files
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.edges.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .map(|index| &self.entities[index])
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &RelationshipEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Members owned by a type, in id order
    pub fn members_of<'a>(&'a self, owner: &'a EntityId) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .iter()
            .filter(move |e| e.kind == EntityKind::Member && e.owner() == Some(owner))
    }
}

pub fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", scope.join(SCOPE_SEPARATOR), SCOPE_SEPARATOR, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str) -> Entity {
        Entity {
            id: EntityId::new(EntityKind::Function, name),
            kind: EntityKind::Function,
            name: name.to_string(),
            qualified_name: name.to_string(),
            scope: vec![],
            language: Language::Python,
            location: SourceLocation {
                file: PathBuf::from("a.py"),
                lines: LineSpan::line(1),
            },
            docs: None,
            occurrence: 1,
            detail: EntityDetail::Function {
                signature: None,
                is_async: false,
            },
            call_sites: vec![],
        }
    }

    #[test]
    fn test_identifier_format() {
        let id = EntityId::new(EntityKind::Member, &qualify(&["Game".into(), "Player".into()], "Move"));
        assert_eq!(id.as_str(), "Member::Game.Player.Move");
        assert_eq!(id.with_occurrence(1), id);
        assert_eq!(id.with_occurrence(3).as_str(), "Member::Game.Player.Move#3");
    }

    #[test]
    fn test_graph_drops_dangling_edges() {
        let mut diagnostics = Vec::new();
        let graph = EntityGraph::new(
            vec![],
            vec![function("b"), function("a")],
            vec![
                RelationshipEdge::new("Function::a".into(), "Function::b".into(), EdgeKind::Calls),
                RelationshipEdge::new("Function::a".into(), "Function::b".into(), EdgeKind::Calls),
                RelationshipEdge::new("Function::a".into(), "Function::zzz".into(), EdgeKind::Calls),
            ],
            &mut diagnostics,
        );

        assert_eq!(graph.entities()[0].name, "a");
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::UnresolvedReference);
        assert_eq!(diagnostics[0].subject, Some("Function::a".into()));
        assert!(diagnostics[0].message.contains("Function::zzz"));
        assert!(graph.get("Function::b").is_some());
        assert!(graph.get("Function::c").is_none());
    }
}
