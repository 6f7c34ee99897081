//! End-to-end extraction pipeline.
//!
//! Files are read and parsed independently on the blocking pool, then the
//! builder and resolver run once over the complete set. The resulting
//! [`EntityGraph`] is immutable; documents and diagrams are derived from it
//! on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::builder::EntityModelBuilder;
use super::diagnostics::{self, Diagnostic, DiagnosticKind};
use super::languages::AdapterRegistry;
use super::model::{EntityGraph, SourceText, SourceUnit};
use super::parser::{CodeParser, FileInput, ParseOutcome};
use super::projector::{DiagramGraph, DiagramProjector, ProjectionMode};
use super::renderer::DocRenderer;
use super::resolver::RelationshipResolver;
use crate::config::Config;
use crate::error::Result;

/// Graph plus every diagnostic recorded while producing it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub graph: EntityGraph,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Pipeline {
    parser: CodeParser,
    builder: EntityModelBuilder,
    resolver: RelationshipResolver,
    projector: DiagramProjector,
    renderer: DocRenderer,
}

impl Pipeline {
    pub fn new(registry: Arc<AdapterRegistry>, max_file_size: usize, max_depth: usize) -> Result<Self> {
        Ok(Self {
            parser: CodeParser::new(registry, max_file_size),
            builder: EntityModelBuilder::new(),
            resolver: RelationshipResolver::new(),
            projector: DiagramProjector::new(max_depth),
            renderer: DocRenderer::new()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(AdapterRegistry::from_config(&config.parsing)?);
        let mut pipeline = Self::new(registry, config.parsing.max_file_size, config.diagrams.max_depth)?;
        pipeline.projector = pipeline.projector.with_members(config.diagrams.include_members);
        pipeline.renderer = pipeline.renderer.with_members(config.diagrams.include_members);
        Ok(pipeline)
    }

    pub fn renderer(&self) -> &DocRenderer {
        &self.renderer
    }

    /// Whether discovery should pick up `path`
    pub fn is_supported(&self, path: &std::path::Path) -> bool {
        self.parser.is_supported(path)
    }

    /// Read and parse files from disk in parallel, then build the graph
    pub async fn parse_files(&self, inputs: Vec<FileInput>) -> Analysis {
        let mut seen = BTreeSet::new();
        let mut tasks = JoinSet::new();
        for input in inputs {
            if !seen.insert(input.path.clone()) {
                continue;
            }
            let parser = self.parser.clone();
            tasks.spawn_blocking(move || parser.parse_file(&input));
        }

        let mut units = Vec::new();
        let mut diagnostics = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => collect(outcome, &mut units, &mut diagnostics),
                Err(e) => {
                    warn!("Parse task failed: {}", e);
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::PartialParse,
                        format!("parse task failed: {}", e),
                    ));
                }
            }
        }

        self.assemble(units, diagnostics)
    }

    /// Analyse in-memory sources
    pub fn analyze_sources(&self, sources: Vec<SourceText>) -> Analysis {
        let mut units = Vec::new();
        let mut diagnostics = Vec::new();
        let mut seen = BTreeSet::new();
        for source in sources {
            if !seen.insert(source.path.clone()) {
                warn!("Ignoring repeated source {}", source.path.display());
                continue;
            }
            collect(self.parser.parse_source(source), &mut units, &mut diagnostics);
        }
        self.assemble(units, diagnostics)
    }

    fn assemble(&self, mut units: Vec<SourceUnit>, mut diagnostics: Vec<Diagnostic>) -> Analysis {
        units.sort_by(|a, b| a.path.cmp(&b.path));

        let built = self.builder.build(&units);
        let resolution = self.resolver.resolve(&built.entities);

        diagnostics.extend(built.diagnostics);
        diagnostics.extend(resolution.diagnostics);
        let graph = EntityGraph::new(built.files, built.entities, resolution.edges, &mut diagnostics);
        diagnostics::normalize(&mut diagnostics);

        info!(
            "Analysed {} files: {} entities, {} relationships, {} diagnostics",
            graph.files().len(),
            graph.entities().len(),
            graph.edges().len(),
            diagnostics.len()
        );

        Analysis { graph, diagnostics }
    }

    /// Markdown documents keyed by relative output path
    pub fn build_docs(&self, graph: &EntityGraph) -> Result<BTreeMap<PathBuf, String>> {
        self.renderer.build_docs(graph)
    }

    pub fn build_diagram(&self, graph: &EntityGraph, mode: ProjectionMode, root: Option<&str>) -> Result<DiagramGraph> {
        self.projector.project(graph, mode, root)
    }

    /// Same as [`Pipeline::build_diagram`] with a caller-chosen depth bound
    pub fn build_diagram_with_depth(
        &self,
        graph: &EntityGraph,
        mode: ProjectionMode,
        root: Option<&str>,
        max_depth: usize,
    ) -> Result<DiagramGraph> {
        self.projector.clone().with_depth(max_depth).project(graph, mode, root)
    }
}

fn collect(outcome: ParseOutcome, units: &mut Vec<SourceUnit>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(unit) = outcome.unit {
        debug!("Collected {}", unit.path.display());
        units.push(unit);
    }
    diagnostics.extend(outcome.diagnostics);
}
