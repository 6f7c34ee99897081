use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

use super::mermaid::MermaidRenderer;
use super::templates::{DIAGNOSTICS_TEMPLATE, DIAGRAM_TEMPLATE, FILE_TEMPLATE};
use crate::core::diagnostics::{self, Diagnostic};
use crate::core::model::{EdgeKind, Entity, EntityDetail, EntityGraph, EntityId, EntityKind, FileSummary};
use crate::core::projector::{DiagramGraph, DiagramNode, DiagramProjector, ProjectionMode};
use crate::error::Result;

const FILE: &str = "file.md";
const DIAGRAM: &str = "diagram.md";
const DIAGNOSTICS: &str = "diagnostics.md";

#[derive(Serialize)]
struct FileDoc {
    title: String,
    path: String,
    language: String,
    line_count: usize,
    content_hash: String,
    file_docs: Option<String>,
    imports: Vec<String>,
    types: Vec<TypeDoc>,
    functions: Vec<FunctionDoc>,
    properties: Vec<PropertyDoc>,
    passes: Vec<PassDoc>,
    structure: Option<String>,
    class_diagram: Option<String>,
}

#[derive(Serialize)]
struct TypeDoc {
    kind: String,
    qualified_name: String,
    visibility: String,
    lines: String,
    docs: Option<String>,
    bases: Vec<String>,
    members: Vec<MemberDoc>,
}

#[derive(Serialize)]
struct MemberDoc {
    name: String,
    kind: String,
    visibility: String,
    value_type: String,
    signature: String,
    docs: Option<String>,
    calls: Vec<String>,
}

#[derive(Serialize)]
struct FunctionDoc {
    qualified_name: String,
    signature: Option<String>,
    docs: Option<String>,
    calls: Vec<String>,
}

#[derive(Serialize)]
struct PropertyDoc {
    name: String,
    display_name: String,
    property_type: String,
    default_value: String,
    attributes: Vec<String>,
}

#[derive(Serialize)]
struct PassDoc {
    qualified_name: String,
    vertex_stage: Option<String>,
    fragment_stage: Option<String>,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct DiagnosticRow {
    kind: String,
    location: String,
    message: String,
}

#[derive(Serialize)]
struct SummaryRow {
    kind: String,
    count: usize,
}

/// Renders per-file Markdown documentation with embedded Mermaid diagrams
pub struct DocRenderer {
    tera: Tera,
    mermaid: MermaidRenderer,
    projector: DiagramProjector,
}

impl DocRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (FILE, FILE_TEMPLATE),
            (DIAGRAM, DIAGRAM_TEMPLATE),
            (DIAGNOSTICS, DIAGNOSTICS_TEMPLATE),
        ])?;
        tera.autoescape_on(vec![]);

        Ok(Self {
            tera,
            mermaid: MermaidRenderer::new(),
            projector: DiagramProjector::default(),
        })
    }

    pub fn with_members(mut self, include_members: bool) -> Self {
        self.projector = self.projector.with_members(include_members);
        self
    }

    /// One document per source file, keyed by its relative output path
    pub fn build_docs(&self, graph: &EntityGraph) -> Result<BTreeMap<PathBuf, String>> {
        let classes = self.projector.project(graph, ProjectionMode::ClassDiagram, None)?;

        let mut docs = BTreeMap::new();
        for file in graph.files() {
            let content = self.render_file(graph, file, &classes)?;
            docs.insert(doc_path(&file.path), content);
        }
        debug!("Rendered {} documents", docs.len());
        Ok(docs)
    }

    fn render_file(&self, graph: &EntityGraph, file: &FileSummary, classes: &DiagramGraph) -> Result<String> {
        let in_file: Vec<&Entity> = graph
            .entities()
            .iter()
            .filter(|e| e.location.file == file.path)
            .collect();
        let type_ids: BTreeSet<&EntityId> = in_file
            .iter()
            .filter(|e| e.kind == EntityKind::Type)
            .map(|e| &e.id)
            .collect();

        let types = in_file
            .iter()
            .filter(|e| e.kind == EntityKind::Type)
            .map(|e| type_doc(graph, e))
            .collect();

        // Free functions plus members defined away from their type
        let functions = in_file
            .iter()
            .filter(|e| match e.kind {
                EntityKind::Function => true,
                EntityKind::Member => {
                    e.is_callable() && e.owner().map_or(true, |owner| !type_ids.contains(owner))
                }
                _ => false,
            })
            .map(|e| FunctionDoc {
                qualified_name: e.qualified_name.clone(),
                signature: e.signature().map(str::to_string),
                docs: e.docs.clone(),
                calls: calls_of(graph, &e.id),
            })
            .collect();

        let mut properties = Vec::new();
        let mut passes = Vec::new();
        for entity in &in_file {
            match &entity.detail {
                EntityDetail::ShaderProperty {
                    display_name,
                    property_type,
                    default_value,
                    attributes,
                    ..
                } => properties.push(PropertyDoc {
                    name: entity.name.clone(),
                    display_name: escape_cell(display_name),
                    property_type: escape_cell(property_type),
                    default_value: escape_cell(default_value),
                    attributes: attributes.iter().map(|a| format!("`[{}]`", a)).collect(),
                }),
                EntityDetail::ShaderPass {
                    vertex_stage,
                    fragment_stage,
                    tags,
                    ..
                } => passes.push(PassDoc {
                    qualified_name: entity.qualified_name.clone(),
                    vertex_stage: vertex_stage.clone(),
                    fragment_stage: fragment_stage.clone(),
                    tags: tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
                }),
                _ => {}
            }
        }

        let class_diagram = file_class_diagram(classes, &type_ids).map(|d| self.mermaid.render_fenced(&d));
        let structure = self
            .mermaid
            .render_structure(file, &in_file)
            .map(|outline| format!("```mermaid\n{}```\n", outline));

        let doc = FileDoc {
            title: file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.path.display().to_string()),
            path: display_path(&file.path),
            language: file.language.display_name().to_string(),
            line_count: file.line_count,
            content_hash: file.content_hash.clone(),
            file_docs: file.file_docs.clone(),
            imports: file.imports.clone(),
            types,
            functions,
            properties,
            passes,
            structure,
            class_diagram,
        };

        let rendered = self.tera.render(FILE, &Context::from_serialize(&doc)?)?;
        Ok(tidy(&rendered))
    }

    /// Standalone page holding one Mermaid diagram
    pub fn render_diagram_page(&self, title: &str, diagram: &DiagramGraph) -> Result<String> {
        let mut context = Context::new();
        context.insert("title", title);
        context.insert("empty", &diagram.is_empty());
        context.insert("diagram", &self.mermaid.render_fenced(diagram));
        Ok(tidy(&self.tera.render(DIAGRAM, &context)?))
    }

    pub fn render_diagnostics(&self, diagnostics: &[Diagnostic]) -> Result<String> {
        let rows: Vec<DiagnosticRow> = diagnostics
            .iter()
            .map(|d| DiagnosticRow {
                kind: d.kind.to_string(),
                location: match (&d.file, &d.span) {
                    (Some(file), Some(span)) => format!("`{}:{}`", display_path(file), span),
                    (Some(file), None) => format!("`{}`", display_path(file)),
                    _ => d.subject.as_ref().map(|s| format!("`{}`", s)).unwrap_or_default(),
                },
                message: escape_cell(&d.message),
            })
            .collect();
        let summary: Vec<SummaryRow> = diagnostics::summarize(diagnostics)
            .into_iter()
            .map(|(kind, count)| SummaryRow {
                kind: kind.to_string(),
                count,
            })
            .collect();

        let mut context = Context::new();
        context.insert("diagnostics", &rows);
        context.insert("summary", &summary);
        Ok(tidy(&self.tera.render(DIAGNOSTICS, &context)?))
    }
}

fn type_doc(graph: &EntityGraph, entity: &Entity) -> TypeDoc {
    let (kind, visibility, bases) = match &entity.detail {
        EntityDetail::Type {
            type_kind,
            visibility,
            bases,
        } => (type_kind.as_str(), format!("{:?}", visibility).to_lowercase(), bases.clone()),
        _ => ("type", String::new(), Vec::new()),
    };

    let members = graph
        .members_of(&entity.id)
        .filter_map(|member| match &member.detail {
            EntityDetail::Member {
                member_kind,
                visibility,
                value_type,
                signature,
                ..
            } => Some(MemberDoc {
                name: member.name.clone(),
                kind: member_kind.as_str().to_string(),
                visibility: format!("{:?}", visibility).to_lowercase(),
                value_type: value_type.as_deref().map(code).unwrap_or_default(),
                signature: signature.as_deref().map(code).unwrap_or_default(),
                docs: member.docs.as_deref().map(single_line),
                calls: calls_of(graph, &member.id),
            }),
            _ => None,
        })
        .collect();

    TypeDoc {
        kind: capitalize(kind),
        qualified_name: entity.qualified_name.clone(),
        visibility,
        lines: entity.location.lines.to_string(),
        docs: entity.docs.clone(),
        bases: bases.iter().map(|b| code(b)).collect(),
        members,
    }
}

/// Qualified names of everything `id` calls
fn calls_of(graph: &EntityGraph, id: &EntityId) -> Vec<String> {
    graph
        .edges_of_kind(EdgeKind::Calls)
        .filter(|e| &e.source == id)
        .map(|e| {
            let name = graph
                .get(e.target.as_str())
                .map(|t| t.qualified_name.as_str())
                .unwrap_or(e.target.as_str());
            code(name)
        })
        .collect()
}

/// The part of the class diagram touching this file's types
fn file_class_diagram(classes: &DiagramGraph, type_ids: &BTreeSet<&EntityId>) -> Option<DiagramGraph> {
    if type_ids.is_empty() {
        return None;
    }

    let edges: Vec<_> = classes
        .edges
        .iter()
        .filter(|e| type_ids.contains(&e.source))
        .cloned()
        .collect();
    let targets: BTreeSet<&EntityId> = edges.iter().map(|e| &e.target).collect();

    let nodes: Vec<DiagramNode> = classes
        .nodes
        .iter()
        .filter_map(|node| {
            if type_ids.contains(&node.id) {
                Some(node.clone())
            } else if targets.contains(&node.id) {
                Some(DiagramNode {
                    attributes: Vec::new(),
                    ..node.clone()
                })
            } else {
                None
            }
        })
        .collect();

    Some(DiagramGraph {
        mode: ProjectionMode::ClassDiagram,
        root: None,
        nodes,
        edges,
    })
}

/// Output path of the document for a source file: `<normal components>.md`
pub fn doc_path(source: &Path) -> PathBuf {
    let mut path: PathBuf = source
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    let file_name = path
        .file_name()
        .map(|n| format!("{}.md", n.to_string_lossy()))
        .unwrap_or_else(|| "index.md".to_string());
    path.set_file_name(file_name);
    path
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn code(text: &str) -> String {
    format!("`{}`", escape_cell(text))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('`', "'")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Collapse runs of blank lines left behind by skipped template sections.
/// Fenced blocks pass through untouched.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let trimmed = out.trim_end();
    format!("{}\n", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::EntityModelBuilder;
    use crate::core::diagnostics::DiagnosticKind;
    use crate::core::languages::AdapterRegistry;
    use crate::core::model::{LineSpan, SourceText};
    use crate::core::parser::CodeParser;
    use crate::core::resolver::RelationshipResolver;
    use std::sync::Arc;

    fn graph(sources: &[(&str, &str)]) -> EntityGraph {
        let parser = CodeParser::new(Arc::new(AdapterRegistry::with_defaults()), 1 << 20);
        let units: Vec<_> = sources
            .iter()
            .filter_map(|(path, text)| parser.parse_source(SourceText::new(*path, *text)).unit)
            .collect();
        let mut built = EntityModelBuilder::new().build(&units);
        let resolution = RelationshipResolver::new().resolve(&built.entities);
        EntityGraph::new(built.files, built.entities, resolution.edges, &mut built.diagnostics)
    }

    const PLAYER: &str = r#"using UnityEngine;

namespace Game
{
    /// <summary>A controllable character.</summary>
    public class Player : Entity
    {
        /// Current health.
        private int health;

        public void TakeDamage(int amount)
        {
            Die();
        }

        private void Die() { }
    }

    public class Entity { }
}
"#;

    #[test]
    fn test_doc_path() {
        assert_eq!(doc_path(Path::new("src/game/Player.cs")), PathBuf::from("src/game/Player.cs.md"));
        assert_eq!(doc_path(Path::new("/abs/../x.py")), PathBuf::from("abs/x.py.md"));
        assert_eq!(doc_path(Path::new("./a.js")), PathBuf::from("a.js.md"));
    }

    #[test]
    fn test_file_document() {
        let graph = graph(&[("Assets/Player.cs", PLAYER)]);
        let docs = DocRenderer::new().unwrap().build_docs(&graph).unwrap();
        assert_eq!(docs.len(), 1);

        let doc = &docs[Path::new("Assets/Player.cs.md")];
        assert!(doc.starts_with("# Player.cs\n"));
        assert!(doc.contains("| Language | C# |"));
        assert!(doc.contains("- `UnityEngine`"));
        assert!(doc.contains("### Class `Game.Player`"));
        assert!(doc.contains("A controllable character."));
        assert!(doc.contains("**Bases**: `Entity`"));
        assert!(doc.contains("| `health` | field | private | `int` |"));
        assert!(doc.contains("- `health`: Current health."));
        assert!(doc.contains("- `TakeDamage` calls `Game.Player.Die`"));
        assert!(doc.contains("```mermaid\nclassDiagram\n"));
        assert!(doc.contains("Game_Entity <|-- Game_Player"));
        assert!(!doc.contains("\n\n\n"));
    }

    #[test]
    fn test_free_functions_and_out_of_line_members() {
        let graph = graph(&[
            ("math.h", "class Vec {\npublic:\n    float Length() const;\n};\n"),
            ("math.cpp", "float Vec::Length() const { return Sqrt(2); }\nfloat Sqrt(float v) { return v; }\n"),
        ]);
        let docs = DocRenderer::new().unwrap().build_docs(&graph).unwrap();

        let source = &docs[Path::new("math.cpp.md")];
        assert!(source.contains("## Functions"));
        assert!(source.contains("### `Vec.Length`"));
        assert!(source.contains("### `Sqrt`"));
        assert!(!source.contains("## Types"));

        let header = &docs[Path::new("math.h.md")];
        assert!(header.contains("| `Length` | method | public |"));
    }

    #[test]
    fn test_shader_document() {
        let graph = graph(&[(
            "Toon.shader",
            "Shader \"Custom/Toon\" {\n    Properties {\n        [HDR] _Color (\"Tint\", Color) = (1,1,1,1)\n    }\n    SubShader {\n        Pass {\n            Tags { \"LightMode\"=\"ForwardBase\" }\n        }\n    }\n}\n",
        )]);
        let docs = DocRenderer::new().unwrap().build_docs(&graph).unwrap();
        let doc = &docs[Path::new("Toon.shader.md")];

        assert!(doc.contains("## Shader Properties"));
        assert!(doc.contains("| `_Color` | Tint | Color | `(1,1,1,1)` | `[HDR]` |"));
        assert!(doc.contains("### `Custom/Toon.SubShader1.Pass1`"));
        assert!(doc.contains("- Tag `LightMode=ForwardBase`"));
    }

    #[test]
    fn test_structure_sections() {
        let graph = graph(&[
            ("Assets/Player.cs", PLAYER),
            (
                "Glow.shader",
                "Shader \"FX/Glow\" {\n    Properties {\n        _Color (\"Tint\", Color) = (1,1,1,1)\n    }\n    SubShader {\n        Pass {\n            CGPROGRAM\n            #pragma vertex vert\n            #pragma fragment frag\n            float4 vert() { return 0; }\n            float4 frag() { return 1; }\n            ENDCG\n        }\n    }\n}\n",
            ),
        ]);
        let docs = DocRenderer::new().unwrap().build_docs(&graph).unwrap();

        let player = &docs[Path::new("Assets/Player.cs.md")];
        assert!(player.contains("## Structure\n\n```mermaid\ngraph TD\n    s0[\"Player.cs (C#)\"]\n    s1[\"Types\"]\n    s0 --> s1\n"));
        assert!(player.contains("[\"Game.Player\"]"));
        assert!(player.contains("[\"TakeDamage\"]"));

        let shader = &docs[Path::new("Glow.shader.md")];
        assert!(shader.contains("graph TD\n    s0[\"FX/Glow\"]\n    s1[\"Properties\"]\n    s0 --> s1\n    s2[\"_Color: Color\"]\n    s1 --> s2\n    s3[\"SubShader1\"]\n    s0 --> s3\n    s4[\"Pass1\"]\n    s3 --> s4\n    s5[\"Vertex: vert\"]\n    s4 --> s5\n    s6[\"Fragment: frag\"]\n    s4 --> s6\n"));
    }

    #[test]
    fn test_tidy_leaves_fenced_blocks_alone() {
        let text = "# Title\n\n\n\n```\na\n\n\nb\n```\n\n\nend\n";
        assert_eq!(tidy(text), "# Title\n\n```\na\n\n\nb\n```\n\nend\n");
    }

    #[test]
    fn test_empty_graph_has_no_documents() {
        let docs = DocRenderer::new().unwrap().build_docs(&EntityGraph::default()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_diagnostics_page() {
        let renderer = DocRenderer::new().unwrap();
        assert!(renderer.render_diagnostics(&[]).unwrap().contains("No diagnostics were reported."));

        let page = renderer
            .render_diagnostics(&[Diagnostic::new(DiagnosticKind::PartialParse, "missing `}`")
                .in_file(Path::new("a.cpp"))
                .at(LineSpan::new(2, 4))])
            .unwrap();
        assert!(page.contains("- **PartialParse**: 1"));
        assert!(page.contains("| PartialParse | `a.cpp:2-4` | missing '}' |"));
    }

    #[test]
    fn test_diagram_page() {
        let renderer = DocRenderer::new().unwrap();
        let empty = DiagramGraph {
            mode: ProjectionMode::CallFlow,
            root: None,
            nodes: vec![],
            edges: vec![],
        };
        let page = renderer.render_diagram_page("Call Flow", &empty).unwrap();
        assert_eq!(page, "# Call Flow\n\nNo entities to show.\n");
    }
}
