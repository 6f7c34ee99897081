//! Diagram projector: derives class diagrams and call-flow graphs from an
//! assembled entity graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{
    EdgeKind, Entity, EntityDetail, EntityGraph, EntityId, EntityKind, MemberKind, RelationshipEdge,
    TypeKind, Visibility,
};
use crate::error::{CodeLensError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionMode {
    ClassDiagram,
    CallFlow,
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionMode::ClassDiagram => f.write_str("class"),
            ProjectionMode::CallFlow => f.write_str("call-flow"),
        }
    }
}

impl FromStr for ProjectionMode {
    type Err = CodeLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "class" | "class-diagram" | "classdiagram" => Ok(ProjectionMode::ClassDiagram),
            "call-flow" | "callflow" | "calls" => Ok(ProjectionMode::CallFlow),
            other => Err(CodeLensError::Config(format!("unknown diagram mode: {}", other))),
        }
    }
}

/// Member line shown inside a class node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramAttribute {
    pub name: String,
    pub visibility: Visibility,
    pub member_kind: MemberKind,
    pub value_type: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: EntityId,
    pub kind: EntityKind,
    pub label: String,
    pub stereotype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<DiagramAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EdgeKind,
}

impl From<&RelationshipEdge> for DiagramEdge {
    fn from(edge: &RelationshipEdge) -> Self {
        Self {
            source: edge.source.clone(),
            target: edge.target.clone(),
            kind: edge.kind,
        }
    }
}

/// Nodes sorted by id, edges by (source, target, kind)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramGraph {
    pub mode: ProjectionMode,
    pub root: Option<EntityId>,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

impl DiagramGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DiagramProjector {
    max_depth: usize,
    include_members: bool,
}

impl Default for DiagramProjector {
    fn default() -> Self {
        Self::new(5)
    }
}

impl DiagramProjector {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            include_members: true,
        }
    }

    pub fn with_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_members(mut self, include_members: bool) -> Self {
        self.include_members = include_members;
        self
    }

    pub fn project(&self, graph: &EntityGraph, mode: ProjectionMode, root: Option<&str>) -> Result<DiagramGraph> {
        let root = match root {
            Some(id) => Some(
                graph
                    .get(id)
                    .ok_or_else(|| CodeLensError::UnknownRoot(id.to_string()))?,
            ),
            None => None,
        };

        let (nodes, edges) = match mode {
            ProjectionMode::ClassDiagram => self.class_diagram(graph, root),
            ProjectionMode::CallFlow => self.call_flow(graph, root),
        };

        let mut nodes: Vec<DiagramNode> = nodes
            .into_iter()
            .filter_map(|id| graph.get(id.as_str()))
            .map(|entity| self.node(graph, entity, mode))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let edges: Vec<DiagramEdge> = edges.into_iter().collect();
        debug!(
            "Projected {} diagram: {} nodes, {} edges",
            mode,
            nodes.len(),
            edges.len()
        );

        Ok(DiagramGraph {
            mode,
            root: root.map(|r| r.id.clone()),
            nodes,
            edges,
        })
    }

    fn class_diagram(
        &self,
        graph: &EntityGraph,
        root: Option<&Entity>,
    ) -> (BTreeSet<EntityId>, BTreeSet<DiagramEdge>) {
        let structural = |edge: &&RelationshipEdge| matches!(edge.kind, EdgeKind::Inherits | EdgeKind::Implements);

        let Some(root) = root else {
            let nodes = graph
                .entities()
                .iter()
                .filter(|e| e.kind == EntityKind::Type)
                .map(|e| e.id.clone())
                .collect();
            let edges = graph.edges().iter().filter(structural).map(DiagramEdge::from).collect();
            return (nodes, edges);
        };

        // A member root stands for its owning type
        let start = match root.kind {
            EntityKind::Type => Some(root.id.clone()),
            _ => root.owner().cloned(),
        };

        let mut neighbours: BTreeMap<&EntityId, Vec<&RelationshipEdge>> = BTreeMap::new();
        for edge in graph.edges().iter().filter(structural) {
            neighbours.entry(&edge.source).or_default().push(edge);
            neighbours.entry(&edge.target).or_default().push(edge);
        }

        let mut visited = BTreeSet::new();
        let mut edges = BTreeSet::new();
        let mut queue = VecDeque::new();
        if let Some(start) = start {
            visited.insert(start.clone());
            queue.push_back((start, 0));
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            for edge in neighbours.get(&current).into_iter().flatten() {
                edges.insert(DiagramEdge::from(*edge));
                let next = if edge.source == current { &edge.target } else { &edge.source };
                if visited.insert(next.clone()) {
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }
        (visited, edges)
    }

    fn call_flow(
        &self,
        graph: &EntityGraph,
        root: Option<&Entity>,
    ) -> (BTreeSet<EntityId>, BTreeSet<DiagramEdge>) {
        let Some(root) = root else {
            let nodes = graph
                .entities()
                .iter()
                .filter(|e| e.is_callable())
                .map(|e| e.id.clone())
                .collect();
            let edges = graph.edges_of_kind(EdgeKind::Calls).map(DiagramEdge::from).collect();
            return (nodes, edges);
        };

        let seeds: Vec<EntityId> = match root.kind {
            _ if root.is_callable() => vec![root.id.clone()],
            EntityKind::Type => graph
                .members_of(&root.id)
                .filter(|m| m.is_callable())
                .map(|m| m.id.clone())
                .collect(),
            EntityKind::ShaderPass => graph
                .edges_of_kind(EdgeKind::Uses)
                .filter(|e| e.source == root.id)
                .map(|e| e.target.clone())
                .collect(),
            _ => Vec::new(),
        };

        let mut callees: BTreeMap<&EntityId, Vec<&RelationshipEdge>> = BTreeMap::new();
        for edge in graph.edges_of_kind(EdgeKind::Calls) {
            callees.entry(&edge.source).or_default().push(edge);
        }

        let mut visited: BTreeSet<EntityId> = seeds.iter().cloned().collect();
        let mut queue: VecDeque<(EntityId, usize)> = seeds.into_iter().map(|id| (id, 0)).collect();
        let mut edges = BTreeSet::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            for edge in callees.get(&current).into_iter().flatten() {
                edges.insert(DiagramEdge::from(*edge));
                if visited.insert(edge.target.clone()) {
                    queue.push_back((edge.target.clone(), depth + 1));
                }
            }
        }
        (visited, edges)
    }

    fn node(&self, graph: &EntityGraph, entity: &Entity, mode: ProjectionMode) -> DiagramNode {
        let stereotype = match entity.type_kind() {
            Some(TypeKind::Class) | None => None,
            Some(kind) => Some(kind.as_str().to_string()),
        };

        let attributes = if mode == ProjectionMode::ClassDiagram && self.include_members {
            graph
                .members_of(&entity.id)
                .filter_map(|member| match &member.detail {
                    EntityDetail::Member {
                        member_kind,
                        visibility,
                        value_type,
                        signature,
                        ..
                    } => Some(DiagramAttribute {
                        name: member.name.clone(),
                        visibility: *visibility,
                        member_kind: *member_kind,
                        value_type: value_type.clone(),
                        signature: signature.clone(),
                    }),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };

        DiagramNode {
            id: entity.id.clone(),
            kind: entity.kind,
            label: entity.qualified_name.clone(),
            stereotype,
            attributes,
        }
    }
}
