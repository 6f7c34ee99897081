use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::core::model::{
    EdgeKind, Entity, EntityDetail, EntityId, EntityKind, FileSummary, Language, MemberKind, TypeKind,
};
use crate::core::projector::{DiagramAttribute, DiagramGraph, DiagramNode, ProjectionMode};

/// Renders diagram graphs as Mermaid source, preserving node order
#[derive(Debug, Clone, Default)]
pub struct MermaidRenderer;

impl MermaidRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, diagram: &DiagramGraph) -> String {
        match diagram.mode {
            ProjectionMode::ClassDiagram => self.class_diagram(diagram),
            ProjectionMode::CallFlow => self.flowchart(diagram),
        }
    }

    /// Mermaid source wrapped in a fenced block for Markdown documents
    pub fn render_fenced(&self, diagram: &DiagramGraph) -> String {
        format!("```mermaid\n{}```\n", self.render(diagram))
    }

    /// `graph TD` outline of one file. Shaders break down into properties,
    /// subshaders, passes and stage programs. Other files break down into
    /// types with their callables, then free functions.
    pub fn render_structure(&self, file: &FileSummary, entities: &[&Entity]) -> Option<String> {
        if entities.is_empty() {
            return None;
        }
        let mut entities = entities.to_vec();
        entities.sort_by(|a, b| {
            (a.location.lines.start, a.id.as_str()).cmp(&(b.location.lines.start, b.id.as_str()))
        });

        let mut outline = Outline::new();
        let shaders: Vec<&Entity> = entities
            .iter()
            .copied()
            .filter(|e| e.type_kind() == Some(TypeKind::Shader))
            .collect();
        if file.language == Language::Shader && !shaders.is_empty() {
            for shader in shaders {
                shader_outline(&mut outline, shader, &entities);
            }
        } else {
            file_outline(&mut outline, file, &entities);
        }
        Some(outline.out)
    }

    fn class_diagram(&self, diagram: &DiagramGraph) -> String {
        let names = NodeNames::new(diagram);
        let mut out = String::from("classDiagram\n");

        for node in &diagram.nodes {
            let name = names.get(&node.id);
            let _ = write!(out, "    class {}[\"{}\"]", name, escape_label(&node.label));
            if node.stereotype.is_none() && node.attributes.is_empty() {
                out.push('\n');
                continue;
            }
            out.push_str(" {\n");
            if let Some(stereotype) = &node.stereotype {
                let _ = writeln!(out, "        <<{}>>", stereotype);
            }
            for attribute in &node.attributes {
                let _ = writeln!(out, "        {}", member_line(attribute));
            }
            out.push_str("    }\n");
        }

        for edge in &diagram.edges {
            let (Some(source), Some(target)) = (names.lookup(&edge.source), names.lookup(&edge.target)) else {
                continue;
            };
            match edge.kind {
                EdgeKind::Inherits => {
                    let _ = writeln!(out, "    {} <|-- {}", target, source);
                }
                EdgeKind::Implements => {
                    let _ = writeln!(out, "    {} ..|> {}", source, target);
                }
                EdgeKind::Calls | EdgeKind::Uses => {
                    let _ = writeln!(out, "    {} --> {}", source, target);
                }
            }
        }
        out
    }

    fn flowchart(&self, diagram: &DiagramGraph) -> String {
        let names = NodeNames::new(diagram);
        let mut out = String::from("flowchart TD\n");

        for node in &diagram.nodes {
            let _ = writeln!(out, "    {}[\"{}\"]", names.get(&node.id), escape_label(&flow_label(node)));
        }
        for edge in &diagram.edges {
            let (Some(source), Some(target)) = (names.lookup(&edge.source), names.lookup(&edge.target)) else {
                continue;
            };
            let arrow = match edge.kind {
                EdgeKind::Uses => "-.->",
                _ => "-->",
            };
            let _ = writeln!(out, "    {} {} {}", source, arrow, target);
        }
        out
    }
}

/// Sequentially named nodes of a structure outline
struct Outline {
    out: String,
    count: usize,
}

impl Outline {
    fn new() -> Self {
        Self {
            out: String::from("graph TD\n"),
            count: 0,
        }
    }

    fn node(&mut self, label: &str) -> String {
        let name = format!("s{}", self.count);
        self.count += 1;
        let _ = writeln!(self.out, "    {}[\"{}\"]", name, escape_label(label));
        name
    }

    fn child(&mut self, parent: &str, label: &str) -> String {
        let name = self.node(label);
        let _ = writeln!(self.out, "    {} --> {}", parent, name);
        name
    }
}

fn owned_by<'e>(entities: &[&'e Entity], owner: &EntityId, kind: EntityKind) -> Vec<&'e Entity> {
    entities
        .iter()
        .copied()
        .filter(|e| e.kind == kind && e.owner() == Some(owner))
        .collect()
}

fn shader_outline(outline: &mut Outline, shader: &Entity, entities: &[&Entity]) {
    let root = outline.node(&shader.qualified_name);

    let properties = owned_by(entities, &shader.id, EntityKind::ShaderProperty);
    if !properties.is_empty() {
        let group = outline.child(&root, "Properties");
        for property in properties {
            let label = match &property.detail {
                EntityDetail::ShaderProperty { property_type, .. } => format!("{}: {}", property.name, property_type),
                _ => property.name.clone(),
            };
            outline.child(&group, &label);
        }
    }

    // passes hang off the subshader named by their innermost scope segment
    let mut subshaders: Vec<(String, String)> = Vec::new();
    for pass in owned_by(entities, &shader.id, EntityKind::ShaderPass) {
        let segment = pass.scope.last().cloned().unwrap_or_default();
        let parent = match subshaders.iter().find(|(s, _)| *s == segment) {
            Some((_, name)) => name.clone(),
            None => {
                let name = outline.child(&root, &segment);
                subshaders.push((segment, name.clone()));
                name
            }
        };
        let node = outline.child(&parent, &pass.name);
        if let EntityDetail::ShaderPass {
            vertex_stage,
            fragment_stage,
            ..
        } = &pass.detail
        {
            if let Some(stage) = vertex_stage {
                outline.child(&node, &format!("Vertex: {}", stage));
            }
            if let Some(stage) = fragment_stage {
                outline.child(&node, &format!("Fragment: {}", stage));
            }
        }
    }
}

fn file_outline(outline: &mut Outline, file: &FileSummary, entities: &[&Entity]) {
    let file_name = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root = outline.node(&format!("{} ({})", file_name, file.language.display_name()));

    let types: Vec<&Entity> = entities.iter().copied().filter(|e| e.kind == EntityKind::Type).collect();
    if !types.is_empty() {
        let group = outline.child(&root, "Types");
        for ty in types {
            let node = outline.child(&group, &ty.qualified_name);
            let methods: Vec<&Entity> = owned_by(entities, &ty.id, EntityKind::Member)
                .into_iter()
                .filter(|m| m.is_callable())
                .collect();
            if methods.is_empty() {
                continue;
            }
            let methods_node = outline.child(&node, "Methods");
            for method in methods {
                outline.child(&methods_node, &method.name);
            }
        }
    }

    let functions: Vec<&Entity> = entities
        .iter()
        .copied()
        .filter(|e| e.kind == EntityKind::Function)
        .collect();
    if !functions.is_empty() {
        let group = outline.child(&root, "Functions");
        for function in functions {
            outline.child(&group, &function.qualified_name);
        }
    }
}

/// Mermaid-safe identifiers for every node, unique within one diagram
struct NodeNames {
    names: BTreeMap<EntityId, String>,
}

impl NodeNames {
    fn new(diagram: &DiagramGraph) -> Self {
        let mut taken = BTreeSet::new();
        let mut names = BTreeMap::new();
        for node in &diagram.nodes {
            let base = sanitize(&node.label);
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            names.insert(node.id.clone(), name);
        }
        Self { names }
    }

    fn get(&self, id: &EntityId) -> &str {
        self.lookup(id).unwrap_or("unknown")
    }

    fn lookup(&self, id: &EntityId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }
}

/// Words Mermaid reads as syntax when used as a node id
const RESERVED: &[&str] = &[
    "end", "graph", "subgraph", "flowchart", "classDiagram", "class", "classDef", "style", "linkStyle",
    "click", "call", "href", "callback", "direction", "default", "namespace", "note",
];

fn sanitize(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'n');
    }
    if RESERVED.iter().any(|word| word.eq_ignore_ascii_case(&name)) {
        name.insert_str(0, "n_");
    }
    name
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

/// Generic brackets use `~` in class diagram members
fn generic(text: &str) -> String {
    text.replace('<', "~").replace('>', "~")
}

fn member_line(attribute: &DiagramAttribute) -> String {
    let visibility = attribute.visibility.symbol();
    match attribute.member_kind {
        MemberKind::Method | MemberKind::Constructor => {
            let params = attribute
                .signature
                .as_deref()
                .and_then(parameter_list)
                .map(|p| generic(&squash(p)))
                .unwrap_or_default();
            match &attribute.value_type {
                Some(value_type) if attribute.member_kind == MemberKind::Method => {
                    format!("{}{}({}) {}", visibility, attribute.name, params, generic(value_type))
                }
                _ => format!("{}{}({})", visibility, attribute.name, params),
            }
        }
        MemberKind::EnumValue => attribute.name.clone(),
        MemberKind::Field | MemberKind::Property | MemberKind::Event => match &attribute.value_type {
            Some(value_type) => format!("{}{} {}", visibility, generic(value_type), attribute.name),
            None => format!("{}{}", visibility, attribute.name),
        },
    }
}

/// Text between the first `(` and its matching `)`
fn parameter_list(signature: &str) -> Option<&str> {
    let open = signature.find('(')?;
    let mut depth = 0usize;
    for (offset, c) in signature[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&signature[open + 1..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn flow_label(node: &DiagramNode) -> String {
    format!("{}()", node.label)
}
