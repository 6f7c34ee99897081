//! Relationship resolver.
//!
//! Links entities across every file of an invocation: base types become
//! `Inherits`/`Implements` edges, call sites become `Calls` edges and shader
//! pass stage entry points become `Uses` edges. Lookups walk the scope chain
//! from the innermost enclosing scope out to the global scope.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::diagnostics::{self, Diagnostic, DiagnosticKind};
use super::model::{
    qualify, EdgeKind, Entity, EntityDetail, EntityKind, LineSpan, RelationshipEdge, TypeKind,
    SCOPE_SEPARATOR,
};

/// Edges plus the references that could not be linked
#[derive(Debug, Default)]
pub struct Resolution {
    pub edges: Vec<RelationshipEdge>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Entities indexed by qualified name
struct SymbolTable<'a> {
    types: BTreeMap<&'a str, Vec<&'a Entity>>,
    callables: BTreeMap<&'a str, Vec<&'a Entity>>,
    functions: BTreeMap<&'a str, Vec<&'a Entity>>,
}

impl<'a> SymbolTable<'a> {
    fn new(entities: &'a [Entity]) -> Self {
        let mut table = Self {
            types: BTreeMap::new(),
            callables: BTreeMap::new(),
            functions: BTreeMap::new(),
        };
        for entity in entities {
            let name = entity.qualified_name.as_str();
            if entity.kind == EntityKind::Type {
                table.types.entry(name).or_default().push(entity);
            }
            if entity.is_callable() {
                table.callables.entry(name).or_default().push(entity);
            }
            if entity.kind == EntityKind::Function {
                table.functions.entry(name).or_default().push(entity);
            }
        }
        for bucket in table
            .types
            .values_mut()
            .chain(table.callables.values_mut())
            .chain(table.functions.values_mut())
        {
            bucket.sort_by(|a, b| (a.occurrence, &a.id).cmp(&(b.occurrence, &b.id)));
        }
        table
    }
}

/// Look `name` up in every enclosing scope of `segments`, innermost first;
/// the first scope level with a match wins
fn scope_walk<'a>(
    index: &BTreeMap<&'a str, Vec<&'a Entity>>,
    segments: &[String],
    name: &str,
    exclude: Option<&Entity>,
) -> Option<&'a Entity> {
    (0..=segments.len()).rev().find_map(|depth| {
        let qualified = qualify(&segments[..depth], name);
        index.get(qualified.as_str()).and_then(|bucket| {
            bucket
                .iter()
                .copied()
                .find(|candidate| exclude.map_or(true, |e| e.id != candidate.id))
        })
    })
}

/// Drop generic arguments and unify scope separators in a base type name
pub fn normalize_base(base: &str) -> String {
    let mut depth = 0usize;
    let mut plain = String::with_capacity(base.len());
    for c in base.chars() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => plain.push(c),
            _ => {}
        }
    }
    let plain = plain.trim().replace("::", SCOPE_SEPARATOR);
    let plain = plain.strip_prefix("global.").unwrap_or(&plain);
    plain.trim_matches('.').to_string()
}

#[derive(Debug, Default)]
pub struct RelationshipResolver;

impl RelationshipResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, entities: &[Entity]) -> Resolution {
        let table = SymbolTable::new(entities);
        let mut edges = BTreeSet::new();
        let mut diagnostics = Vec::new();

        for entity in entities {
            match &entity.detail {
                EntityDetail::Type { bases, .. } => {
                    self.resolve_bases(&table, entity, bases, &mut edges, &mut diagnostics)
                }
                EntityDetail::ShaderPass {
                    vertex_stage,
                    fragment_stage,
                    ..
                } => {
                    let stages = [("vertex", vertex_stage), ("fragment", fragment_stage)];
                    for (stage, name) in stages {
                        if let Some(name) = name {
                            self.resolve_stage(&table, entity, stage, name, &mut edges, &mut diagnostics);
                        }
                    }
                }
                _ => {}
            }
            if entity.is_callable() {
                self.resolve_calls(&table, entity, &mut edges, &mut diagnostics);
            }
        }

        diagnostics::normalize(&mut diagnostics);
        debug!(
            "Resolved {} relationships ({} unresolved references)",
            edges.len(),
            diagnostics.len()
        );

        Resolution {
            edges: edges.into_iter().collect(),
            diagnostics,
        }
    }

    fn resolve_bases(
        &self,
        table: &SymbolTable,
        entity: &Entity,
        bases: &[String],
        edges: &mut BTreeSet<RelationshipEdge>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for base in bases {
            let name = normalize_base(base);
            // keyword arguments such as `metaclass=ABCMeta`
            if name.is_empty() || name.contains('=') {
                continue;
            }

            let target = scope_walk(&table.types, &entity.scope, &name, Some(entity)).or_else(|| {
                let suffix = format!("{}{}", SCOPE_SEPARATOR, name);
                table
                    .types
                    .iter()
                    .filter(|(qualified, _)| qualified.ends_with(&suffix))
                    .flat_map(|(_, bucket)| bucket.iter().copied())
                    .filter(|candidate| candidate.id != entity.id)
                    .min_by(|a, b| a.id.cmp(&b.id))
            });

            let Some(target) = target else {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnresolvedReference,
                        format!("base type `{}` of {} is not declared in the analysed files", base, entity.name),
                    )
                    .in_file(&entity.location.file)
                    .at(entity.location.lines)
                    .with_subject(entity.id.clone()),
                );
                continue;
            };

            let kind = match (entity.type_kind(), target.type_kind()) {
                (Some(source), Some(TypeKind::Interface)) if source != TypeKind::Interface => {
                    EdgeKind::Implements
                }
                _ => EdgeKind::Inherits,
            };
            edges.insert(RelationshipEdge::new(entity.id.clone(), target.id.clone(), kind));
        }
    }

    fn resolve_calls(
        &self,
        table: &SymbolTable,
        caller: &Entity,
        edges: &mut BTreeSet<RelationshipEdge>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let segments = own_segments(caller);
        let mut unresolved = BTreeSet::new();

        for site in &caller.call_sites {
            match scope_walk(&table.callables, &segments, &site.callee, None) {
                Some(target) if target.id == caller.id => {}
                Some(target) => {
                    edges.insert(RelationshipEdge::new(
                        caller.id.clone(),
                        target.id.clone(),
                        EdgeKind::Calls,
                    ));
                }
                None => {
                    if unresolved.insert(site.callee.as_str()) {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::UnresolvedReference,
                                format!("call to `{}` does not match any known function", site.callee),
                            )
                            .in_file(&caller.location.file)
                            .at(LineSpan::line(site.line))
                            .with_subject(caller.id.clone()),
                        );
                    }
                }
            }
        }
    }

    fn resolve_stage(
        &self,
        table: &SymbolTable,
        pass: &Entity,
        stage: &str,
        name: &str,
        edges: &mut BTreeSet<RelationshipEdge>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        match scope_walk(&table.functions, &own_segments(pass), name, None) {
            Some(target) => {
                edges.insert(RelationshipEdge::new(pass.id.clone(), target.id.clone(), EdgeKind::Uses));
            }
            None => diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnresolvedReference,
                    format!("{} stage `{}` of pass {} is not defined", stage, name, pass.name),
                )
                .in_file(&pass.location.file)
                .at(pass.location.lines)
                .with_subject(pass.id.clone()),
            ),
        }
    }
}

/// Scope segments of everything declared inside `entity`
fn own_segments(entity: &Entity) -> Vec<String> {
    let mut segments = entity.scope.clone();
    segments.push(entity.name.clone());
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::EntityModelBuilder;
    use crate::core::languages::AdapterRegistry;
    use crate::core::model::SourceText;
    use crate::core::parser::CodeParser;
    use std::sync::Arc;

    fn resolve(sources: &[(&str, &str)]) -> (Vec<Entity>, Resolution) {
        let parser = CodeParser::new(Arc::new(AdapterRegistry::with_defaults()), 1 << 20);
        let units: Vec<_> = sources
            .iter()
            .filter_map(|(path, text)| parser.parse_source(SourceText::new(*path, *text)).unit)
            .collect();
        let entities = EntityModelBuilder::new().build(&units).entities;
        let resolution = RelationshipResolver::new().resolve(&entities);
        (entities, resolution)
    }

    fn edges(resolution: &Resolution, kind: EdgeKind) -> Vec<(String, String)> {
        resolution
            .edges
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (e.source.to_string(), e.target.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("List<Dictionary<string, int>>"), "List");
        assert_eq!(normalize_base("std::vector<int>"), "std.vector");
        assert_eq!(normalize_base("global::Game.Entity"), "Game.Entity");
        assert_eq!(normalize_base(" Base "), "Base");
    }

    #[test]
    fn test_inherits_and_implements_across_files() {
        let (_, resolution) = resolve(&[
            (
                "Entity.cs",
                "namespace Game {\n    public abstract class Entity {}\n    public interface IDamageable {}\n}\n",
            ),
            (
                "Player.cs",
                "namespace Game {\n    public class Player : Entity, IDamageable {}\n}\n",
            ),
        ]);

        assert_eq!(
            edges(&resolution, EdgeKind::Inherits),
            vec![("Type::Game.Player".to_string(), "Type::Game.Entity".to_string())]
        );
        assert_eq!(
            edges(&resolution, EdgeKind::Implements),
            vec![("Type::Game.Player".to_string(), "Type::Game.IDamageable".to_string())]
        );
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_interface_extending_interface_inherits() {
        let (_, resolution) = resolve(&[(
            "Api.cs",
            "interface IBase {}\ninterface IDerived : IBase {}\n",
        )]);
        assert_eq!(
            edges(&resolution, EdgeKind::Inherits),
            vec![("Type::IDerived".to_string(), "Type::IBase".to_string())]
        );
    }

    #[test]
    fn test_base_prefers_declaring_scope() {
        let (_, resolution) = resolve(&[
            ("a.cs", "namespace A { class Base {} class Child : Base {} }\n"),
            ("b.cs", "namespace B { class Base {} }\n"),
        ]);
        assert_eq!(
            edges(&resolution, EdgeKind::Inherits),
            vec![("Type::A.Child".to_string(), "Type::A.Base".to_string())]
        );
    }

    #[test]
    fn test_unresolved_base_reports_without_edge() {
        let (_, resolution) = resolve(&[("enemy.py", "class Enemy(Actor):\n    pass\n")]);
        assert!(resolution.edges.is_empty());
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(resolution.diagnostics[0].kind, DiagnosticKind::UnresolvedReference);
        assert_eq!(
            resolution.diagnostics[0].subject.as_ref().map(|s| s.as_str()),
            Some("Type::Enemy")
        );
    }

    #[test]
    fn test_calls_walk_scope_outwards() {
        let (_, resolution) = resolve(&[(
            "game.py",
            r#"def clamp(v):
    return v

class Player:
    def reset(self):
        self.update()
        clamp(0)
        missing()
        missing()

    def update(self):
        self.update()
"#,
        )]);

        assert_eq!(
            edges(&resolution, EdgeKind::Calls),
            vec![
                ("Member::Player.reset".to_string(), "Function::clamp".to_string()),
                ("Member::Player.reset".to_string(), "Member::Player.update".to_string()),
            ]
        );
        assert_eq!(resolution.diagnostics.len(), 1);
        assert!(resolution.diagnostics[0].message.contains("missing"));
    }

    #[test]
    fn test_call_cycles_are_preserved() {
        let (_, resolution) = resolve(&[(
            "cycle.js",
            "function a() { b(); }\nfunction b() { a(); }\n",
        )]);
        assert_eq!(
            edges(&resolution, EdgeKind::Calls),
            vec![
                ("Function::a".to_string(), "Function::b".to_string()),
                ("Function::b".to_string(), "Function::a".to_string()),
            ]
        );
    }

    #[test]
    fn test_shader_pass_uses_stage_functions() {
        let shader = r#"Shader "Custom/Toon" {
    SubShader {
        Pass {
            Name "ForwardBase"
            CGPROGRAM
            #pragma vertex vert
            #pragma fragment frag
            v2f vert(appdata_base v) {
                v2f o;
                return o;
            }
            ENDCG
        }
    }
}
"#;
        let (_, resolution) = resolve(&[("toon.shader", shader)]);

        assert_eq!(
            edges(&resolution, EdgeKind::Uses),
            vec![(
                "ShaderPass::Custom/Toon.SubShader1.ForwardBase".to_string(),
                "Function::Custom/Toon.SubShader1.ForwardBase.vert".to_string()
            )]
        );
        assert_eq!(resolution.diagnostics.len(), 1);
        assert!(resolution.diagnostics[0].message.contains("frag"));
    }
}
