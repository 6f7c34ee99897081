//! Entity model builder.
//!
//! Turns the raw tokens of every parsed file into entities with stable
//! identifiers. Identifiers depend only on declaration kind and qualified
//! name, never on file paths, so renaming a file keeps every id intact.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use tracing::debug;

use super::diagnostics::{self, Diagnostic, DiagnosticKind};
use super::model::{
    CallSite, Declaration, Entity, EntityDetail, EntityId, EntityKind, FileSummary, RawToken,
    SourceLocation, SourceUnit, SCOPE_SEPARATOR,
};

/// Everything the builder produces for one invocation
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub files: Vec<FileSummary>,
    pub entities: Vec<Entity>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Position of a token: (unit index, token index)
type TokenRef = (usize, usize);

/// A declaration token waiting for its final identifier
struct Candidate<'a> {
    at: TokenRef,
    unit: &'a SourceUnit,
    kind: EntityKind,
    decl: &'a Declaration,
    base_id: EntityId,
    signature: String,
    callable: bool,
    has_body: bool,
}

impl Candidate<'_> {
    fn path(&self) -> &Path {
        &self.unit.path
    }

    fn order_key(&self) -> (usize, usize, &str, &Path) {
        (self.decl.span.start, self.decl.span.end, self.signature.as_str(), self.path())
    }

    fn token(&self) -> &RawToken {
        &self.unit.tokens[self.at.1]
    }
}

#[derive(Debug, Default)]
pub struct EntityModelBuilder;

impl EntityModelBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, units: &[SourceUnit]) -> BuildOutput {
        let mut ordered: Vec<&SourceUnit> = units.iter().collect();
        ordered.sort_by(|a, b| a.path.cmp(&b.path));

        let mut output = BuildOutput {
            files: ordered.iter().map(|unit| FileSummary::from(*unit)).collect(),
            ..Default::default()
        };

        let mut candidates = Vec::new();
        let mut calls: HashMap<TokenRef, Vec<CallSite>> = HashMap::new();
        for (unit_index, unit) in ordered.iter().enumerate() {
            for (token_index, token) in unit.tokens.iter().enumerate() {
                match token {
                    RawToken::Call(call) => {
                        calls.entry((unit_index, call.caller)).or_default().push(CallSite {
                            callee: call.callee.clone(),
                            line: call.line,
                        });
                    }
                    RawToken::Malformed(malformed) => {
                        output.diagnostics.push(
                            Diagnostic::new(DiagnosticKind::PartialParse, malformed.message.clone())
                                .in_file(&unit.path)
                                .at(malformed.span),
                        );
                    }
                    RawToken::Import(_) => {}
                    _ => {
                        if let Some(candidate) = candidate(unit, (unit_index, token_index), token) {
                            candidates.push(candidate);
                        }
                    }
                }
            }
        }

        let assigned = assign_ids(&candidates, &mut output.diagnostics);

        let known: BTreeSet<&EntityId> = assigned.survivors.iter().map(|(_, id)| id).collect();
        let owner_of = |candidate: &Candidate| -> Option<EntityId> {
            let parent = match candidate.token() {
                RawToken::Member(m) => m.parent,
                RawToken::ShaderProperty(p) => p.parent,
                RawToken::ShaderPass(p) => p.parent,
                _ => return None,
            };
            if let Some(id) = parent.and_then(|p| assigned.ids.get(&(candidate.at.0, p))) {
                return Some(id.clone());
            }
            if candidate.decl.scope.is_empty() {
                return None;
            }
            let id = EntityId::new(EntityKind::Type, &candidate.decl.scope.join(SCOPE_SEPARATOR));
            known.contains(&id).then_some(id)
        };

        for (index, id) in &assigned.survivors {
            let candidate = &candidates[*index];
            let mut entity = entity(candidate, id.clone(), owner_of(candidate));

            let out_of_line = matches!(candidate.token(), RawToken::Member(m) if m.parent.is_none());
            for merged in assigned.merged.get(index).into_iter().flatten() {
                let prototype = &candidates[*merged];
                inherit(&mut entity, out_of_line, prototype, owner_of(prototype));
            }
            entity.call_sites = calls.remove(&candidate.at).unwrap_or_default();
            output.entities.push(entity);
        }

        output.entities.sort_by(|a, b| a.id.cmp(&b.id));
        diagnostics::normalize(&mut output.diagnostics);

        debug!(
            "Built {} entities from {} files ({} diagnostics)",
            output.entities.len(),
            output.files.len(),
            output.diagnostics.len()
        );
        output
    }
}

fn candidate<'a>(unit: &'a SourceUnit, at: TokenRef, token: &'a RawToken) -> Option<Candidate<'a>> {
    let (kind, signature, callable, has_body) = match token {
        RawToken::Type(_) => (EntityKind::Type, None, false, true),
        RawToken::Member(m) => (
            EntityKind::Member,
            m.signature.as_deref(),
            m.member_kind.is_callable(),
            m.has_body,
        ),
        RawToken::Function(f) => (EntityKind::Function, f.signature.as_deref(), true, f.has_body),
        RawToken::ShaderProperty(_) => (EntityKind::ShaderProperty, None, false, true),
        RawToken::ShaderPass(_) => (EntityKind::ShaderPass, None, false, true),
        RawToken::Call(_) | RawToken::Import(_) | RawToken::Malformed(_) => return None,
    };
    let decl = token.declaration()?;

    Some(Candidate {
        at,
        unit,
        kind,
        decl,
        base_id: EntityId::new(kind, &decl.qualified_name()),
        signature: signature.unwrap_or_default().to_string(),
        callable,
        has_body,
    })
}

#[derive(Default)]
struct Assigned {
    /// Surviving candidates with their final ids, in id-group order
    survivors: Vec<(usize, EntityId)>,
    /// Final id of every declaration token, merged prototypes included
    ids: HashMap<TokenRef, EntityId>,
    /// Prototypes folded into a definition, keyed by the definition
    merged: BTreeMap<usize, Vec<usize>>,
}

/// Give every candidate its final identifier, numbering duplicates and
/// folding body-less prototypes into their definition
fn assign_ids(candidates: &[Candidate], diagnostics: &mut Vec<Diagnostic>) -> Assigned {
    let mut groups: BTreeMap<&EntityId, Vec<usize>> = BTreeMap::new();
    for (index, candidate) in candidates.iter().enumerate() {
        groups.entry(&candidate.base_id).or_default().push(index);
    }

    let mut assigned = Assigned::default();
    for (base_id, mut group) in groups {
        group.sort_by(|a, b| candidates[*a].order_key().cmp(&candidates[*b].order_key()));

        let definition = group
            .iter()
            .copied()
            .find(|i| candidates[*i].callable && candidates[*i].has_body);
        let prototypes: Vec<usize> = match definition {
            Some(_) => group
                .iter()
                .copied()
                .filter(|i| candidates[*i].callable && !candidates[*i].has_body)
                .collect(),
            None => Vec::new(),
        };
        if let Some(definition) = definition {
            if !prototypes.is_empty() {
                assigned.merged.insert(definition, prototypes.clone());
            }
        }

        let mut first: Option<&Candidate> = None;
        let mut occurrence = 0;
        for index in group.iter().copied().filter(|i| !prototypes.contains(i)) {
            let candidate = &candidates[index];
            occurrence += 1;
            let id = base_id.with_occurrence(occurrence);

            match first {
                None => first = Some(candidate),
                Some(original) => diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateDeclaration,
                        format!(
                            "{} is already declared at {}:{}",
                            base_id,
                            original.path().display(),
                            original.decl.span
                        ),
                    )
                    .in_file(candidate.path())
                    .at(candidate.decl.span)
                    .with_subject(id.clone()),
                ),
            }

            assigned.ids.insert(candidate.at, id.clone());
            if let Some(prototypes) = assigned.merged.get(&index) {
                for prototype in prototypes {
                    assigned.ids.insert(candidates[*prototype].at, id.clone());
                }
            }
            assigned.survivors.push((index, id));
        }
    }
    assigned
}

fn entity(candidate: &Candidate, id: EntityId, owner: Option<EntityId>) -> Entity {
    let detail = match candidate.token() {
        RawToken::Type(t) => EntityDetail::Type {
            type_kind: t.type_kind,
            visibility: t.visibility,
            bases: t.bases.clone(),
        },
        RawToken::Member(m) => EntityDetail::Member {
            member_kind: m.member_kind,
            visibility: m.visibility,
            value_type: m.value_type.clone(),
            signature: m.signature.clone(),
            owner,
        },
        RawToken::Function(f) => EntityDetail::Function {
            signature: f.signature.clone(),
            is_async: f.is_async,
        },
        RawToken::ShaderProperty(p) => EntityDetail::ShaderProperty {
            display_name: p.display_name.clone(),
            property_type: p.property_type.clone(),
            default_value: p.default_value.clone(),
            attributes: p.attributes.clone(),
            owner,
        },
        RawToken::ShaderPass(p) => EntityDetail::ShaderPass {
            vertex_stage: p.vertex_stage.clone(),
            fragment_stage: p.fragment_stage.clone(),
            tags: p.tags.clone(),
            owner,
        },
        // Filtered out when candidates are collected
        RawToken::Call(_) | RawToken::Import(_) | RawToken::Malformed(_) => EntityDetail::Function {
            signature: None,
            is_async: false,
        },
    };

    let occurrence = id
        .as_str()
        .strip_prefix(candidate.base_id.as_str())
        .and_then(|rest| rest.strip_prefix('#'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);

    Entity {
        id,
        kind: candidate.kind,
        name: candidate.decl.name.clone(),
        qualified_name: candidate.decl.qualified_name(),
        scope: candidate.decl.scope.clone(),
        language: candidate.unit.language,
        location: SourceLocation {
            file: candidate.unit.path.clone(),
            lines: candidate.decl.span,
        },
        docs: candidate.decl.docs.clone(),
        occurrence,
        detail,
        call_sites: Vec::new(),
    }
}

/// Fill gaps in a definition from a prototype of the same symbol
fn inherit(
    entity: &mut Entity,
    out_of_line: bool,
    prototype: &Candidate,
    prototype_owner: Option<EntityId>,
) {
    if entity.docs.is_none() {
        entity.docs = prototype.decl.docs.clone();
    }

    let (prototype_visibility, prototype_value_type) = match prototype.token() {
        RawToken::Member(m) => (m.visibility, m.value_type.clone()),
        _ => return,
    };
    if let EntityDetail::Member {
        visibility,
        value_type,
        owner,
        ..
    } = &mut entity.detail
    {
        // Out-of-line definitions carry no access label of their own
        if out_of_line {
            *visibility = prototype_visibility;
        }
        if owner.is_none() {
            *owner = prototype_owner;
        }
        if value_type.is_none() {
            *value_type = prototype_value_type;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::languages::AdapterRegistry;
    use crate::core::model::{MemberKind, SourceText, Visibility};
    use crate::core::parser::CodeParser;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn units(sources: &[(&str, &str)]) -> Vec<SourceUnit> {
        let parser = CodeParser::new(Arc::new(AdapterRegistry::with_defaults()), 1 << 20);
        sources
            .iter()
            .filter_map(|(path, text)| parser.parse_source(SourceText::new(*path, *text)).unit)
            .collect()
    }

    fn ids(output: &BuildOutput) -> Vec<&str> {
        output.entities.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_header_prototype_merges_with_definition() {
        let output = EntityModelBuilder::new().build(&units(&[
            (
                "src/player.cpp",
                "namespace game {\nvoid Player::Move(float dx) {\n    Step(dx);\n}\n}\n",
            ),
            (
                "include/player.h",
                "namespace game {\nclass Player {\nprivate:\n    /// Moves the player.\n    void Move(float dx);\n};\n}\n",
            ),
        ]));

        assert_eq!(ids(&output), vec!["Member::game.Player.Move", "Type::game.Player"]);
        assert!(output.diagnostics.is_empty());

        let method = &output.entities[0];
        assert_eq!(method.location.file, PathBuf::from("src/player.cpp"));
        assert_eq!(method.docs.as_deref(), Some("Moves the player."));
        assert_eq!(method.owner().map(|o| o.as_str()), Some("Type::game.Player"));
        assert_eq!(method.call_sites.len(), 1);
        assert_eq!(method.call_sites[0].callee, "Step");
        match &method.detail {
            EntityDetail::Member { visibility, member_kind, .. } => {
                assert_eq!(*visibility, Visibility::Private);
                assert_eq!(*member_kind, MemberKind::Method);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_are_numbered_in_declaration_order() {
        let sources = [
            ("b.py", "def helper():\n    pass\n"),
            ("a.py", "\n\ndef helper():\n    pass\n"),
        ];
        let output = EntityModelBuilder::new().build(&units(&sources));

        assert_eq!(ids(&output), vec!["Function::helper", "Function::helper#2"]);
        assert_eq!(output.entities[0].location.file, PathBuf::from("b.py"));
        assert_eq!(output.entities[1].occurrence, 2);

        assert_eq!(output.diagnostics.len(), 1);
        let diagnostic = &output.diagnostics[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::DuplicateDeclaration);
        assert_eq!(diagnostic.subject.as_ref().map(|s| s.as_str()), Some("Function::helper#2"));
        assert_eq!(diagnostic.file.as_deref(), Some(Path::new("a.py")));
    }

    #[test]
    fn test_duplicate_tie_breaks_on_path() {
        let forward = [("a.py", "def f():\n    pass\n"), ("b.py", "def f():\n    pass\n")];
        let reversed = [forward[1], forward[0]];

        for sources in [&forward, &reversed] {
            let output = EntityModelBuilder::new().build(&units(sources));
            assert_eq!(output.entities[0].location.file, PathBuf::from("a.py"));
            assert_eq!(output.entities[1].location.file, PathBuf::from("b.py"));
        }
    }

    #[test]
    fn test_ids_do_not_depend_on_paths() {
        let text = "class Enemy:\n    def attack(self):\n        pass\n";
        let first = EntityModelBuilder::new().build(&units(&[("game/enemy.py", text)]));
        let second = EntityModelBuilder::new().build(&units(&[("renamed.py", text)]));
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), vec!["Member::Enemy.attack", "Type::Enemy"]);
    }

    #[test]
    fn test_malformed_tokens_become_partial_parse() {
        let output = EntityModelBuilder::new().build(&units(&[(
            "broken.cpp",
            "class Broken {\n    int x;\n\nclass Fine {};\n",
        )]));

        assert_eq!(ids(&output), vec!["Type::Fine"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].kind, DiagnosticKind::PartialParse);
        assert_eq!(output.diagnostics[0].span.map(|s| s.start), Some(1));
    }

    #[test]
    fn test_shader_properties_are_owned_by_the_shader() {
        let output = EntityModelBuilder::new().build(&units(&[(
            "toon.shader",
            "Shader \"Custom/Toon\" {\n    Properties {\n        _Color (\"Tint\", Color) = (1,1,1,1)\n    }\n    SubShader {\n        Pass {\n        }\n    }\n}\n",
        )]));

        let property = output
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::ShaderProperty)
            .expect("shader property");
        assert_eq!(property.id.as_str(), "ShaderProperty::Custom/Toon._Color");
        assert_eq!(property.owner().map(|o| o.as_str()), Some("Type::Custom/Toon"));
        assert_eq!(output.files.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let output = EntityModelBuilder::new().build(&[]);
        assert!(output.entities.is_empty());
        assert!(output.files.is_empty());
        assert!(output.diagnostics.is_empty());
    }
}
