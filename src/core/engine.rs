// src/core/engine.rs
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::CodeLensError;
use super::diagnostics;
use super::parser::FileInput;
use super::pipeline::{Analysis, Pipeline};
use super::projector::ProjectionMode;
use super::renderer::MermaidRenderer;

const CONFIG_FILE: &str = "codelens.toml";

/// Main orchestration engine: discovery, analysis and output writing
pub struct Engine {
    config: Config,
    pipeline: Pipeline,
}

impl Engine {
    /// Create a new engine instance from a configuration file
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self { config, pipeline })
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        info!("Initializing CodeLens in: {}", target_dir.display());

        std::fs::create_dir_all(&target_dir)?;
        let config_path = target_dir.join(CONFIG_FILE);
        if config_path.exists() && !force {
            warn!("{} already exists, leaving it untouched", config_path.display());
            return Ok(());
        }

        let mut config = Config::default();
        if let Some(name) = target_dir.file_name() {
            config.project.name = name.to_string_lossy().into_owned();
        }
        config.save(&config_path)?;
        info!("Wrote {}", config_path.display());
        Ok(())
    }

    /// Dump the entity graph and diagnostics as JSON
    pub async fn parse(&self, paths: Vec<PathBuf>, output: Option<PathBuf>) -> Result<()> {
        let analysis = self.analyze(&paths).await?;
        let json = serde_json::to_string_pretty(&analysis).map_err(CodeLensError::from)?;
        self.emit(&json, output.as_deref())?;
        report(&analysis);
        Ok(())
    }

    /// Generate Markdown documentation for every source file plus overview pages
    pub async fn generate(&self, source: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
        let roots = match source {
            Some(source) => vec![source],
            None => self.config.project.source_dirs.clone(),
        };
        let output_dir = output.unwrap_or_else(|| self.config.project.docs_dir.clone());

        info!("Source: {}", display_roots(&roots));
        info!("Output: {}", output_dir.display());

        let analysis = self.analyze(&roots).await?;
        let graph = &analysis.graph;

        let mut pages = BTreeMap::new();
        for (path, content) in self.pipeline.build_docs(graph)? {
            pages.insert(relative_to_roots(&path, &roots), content);
        }

        let renderer = self.pipeline.renderer();
        let class_diagram = self.pipeline.build_diagram(graph, ProjectionMode::ClassDiagram, None)?;
        pages.insert(
            PathBuf::from("class_diagram.md"),
            renderer.render_diagram_page("Class Diagram", &class_diagram)?,
        );
        let call_flow = self.pipeline.build_diagram(graph, ProjectionMode::CallFlow, None)?;
        pages.insert(
            PathBuf::from("call_flow.md"),
            renderer.render_diagram_page("Call Flow", &call_flow)?,
        );
        if self.config.output.write_diagnostics {
            pages.insert(
                PathBuf::from("diagnostics.md"),
                renderer.render_diagnostics(&analysis.diagnostics)?,
            );
        }

        for (relative, content) in &pages {
            let target = output_dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, self.with_header(content))
                .with_context(|| format!("Failed to write {}", target.display()))?;
            debug!("Wrote {}", target.display());
        }

        let graph_path = output_dir.join("entity_graph.json");
        std::fs::write(&graph_path, serde_json::to_string_pretty(&analysis).map_err(CodeLensError::from)?)?;

        report(&analysis);
        info!("Documentation written: {} pages in {}", pages.len(), output_dir.display());
        Ok(())
    }

    /// Render a class diagram or call flow as Mermaid text
    pub async fn diagram(
        &self,
        paths: Vec<PathBuf>,
        mode: ProjectionMode,
        root: Option<String>,
        depth: Option<usize>,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let analysis = self.analyze(&paths).await?;
        let max_depth = depth.unwrap_or(self.config.diagrams.max_depth);
        let diagram = self
            .pipeline
            .build_diagram_with_depth(&analysis.graph, mode, root.as_deref(), max_depth)?;

        info!(
            "{} diagram: {} nodes, {} edges",
            mode,
            diagram.nodes.len(),
            diagram.edges.len()
        );
        let text = MermaidRenderer::new().render(&diagram);
        self.emit(&text, output.as_deref())?;
        Ok(())
    }

    /// Discover and analyse everything under `paths` (configured source
    /// directories when empty)
    pub async fn analyze(&self, paths: &[PathBuf]) -> Result<Analysis> {
        let roots = if paths.is_empty() {
            self.config.project.source_dirs.clone()
        } else {
            paths.to_vec()
        };
        let inputs = self.discover(&roots)?;
        info!("Analysing {} files", inputs.len());
        Ok(self.pipeline.parse_files(inputs).await)
    }

    /// Source files under the given roots, honouring `.gitignore` and the
    /// configured ignore patterns. Files named directly are always kept so
    /// that unsupported ones are reported.
    pub fn discover(&self, roots: &[PathBuf]) -> Result<Vec<FileInput>> {
        let mut inputs = Vec::new();

        for root in roots {
            if root.is_file() {
                inputs.push(FileInput::new(root));
                continue;
            }
            if !root.exists() {
                warn!("Source path {} does not exist", root.display());
                continue;
            }

            let mut overrides = OverrideBuilder::new(root);
            for pattern in &self.config.project.ignore_patterns {
                overrides
                    .add(&format!("!{}", pattern))
                    .map_err(|e| CodeLensError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
            }
            let overrides = overrides
                .build()
                .map_err(|e| CodeLensError::Config(e.to_string()))?;

            let walker = WalkBuilder::new(root)
                .hidden(false)
                .git_ignore(true)
                .overrides(overrides)
                .build();

            for entry in walker {
                let entry = entry.map_err(|e| CodeLensError::FileSystem(e.to_string()))?;
                let path = entry.path();
                if path.is_file() && self.pipeline.is_supported(path) {
                    inputs.push(FileInput::new(path));
                }
            }
        }

        inputs.sort_by(|a, b| a.path.cmp(&b.path));
        inputs.dedup();
        Ok(inputs)
    }

    fn with_header(&self, content: &str) -> String {
        if !self.config.output.include_metadata {
            return content.to_string();
        }
        format!(
            "<!-- Generated by codelens {} on {} -->\n\n{}",
            env!("CARGO_PKG_VERSION"),
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            content
        )
    }

    fn emit(&self, text: &str, output: Option<&Path>) -> Result<()> {
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {}", path.display());
            }
            None => println!("{}", text),
        }
        Ok(())
    }
}

fn report(analysis: &Analysis) {
    for (kind, count) in diagnostics::summarize(&analysis.diagnostics) {
        warn!("{} {} diagnostic(s)", count, kind);
    }
    for diagnostic in &analysis.diagnostics {
        debug!("{}", diagnostic);
    }
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strip the source root from a document path so output mirrors the tree
/// below the root
fn relative_to_roots(path: &Path, roots: &[PathBuf]) -> PathBuf {
    for root in roots.iter().filter(|r| r.is_dir()) {
        let prefix: PathBuf = root
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        if prefix.as_os_str().is_empty() {
            continue;
        }
        if let Ok(stripped) = path.strip_prefix(&prefix) {
            return stripped.to_path_buf();
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn engine(include_metadata: bool) -> Engine {
        let mut config = Config::default();
        config.output.include_metadata = include_metadata;
        Engine::with_config(config).unwrap()
    }

    fn project() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/game/Player.cs")
            .write_str("namespace Game {\n    /// The hero.\n    public class Player : Actor {\n        public void Jump() { Land(); }\n        void Land() { }\n    }\n    public class Actor { }\n}\n")
            .unwrap();
        temp.child("src/tools/build.py")
            .write_str("def main():\n    run()\n\ndef run():\n    pass\n")
            .unwrap();
        temp.child("src/node_modules/lib/index.js")
            .write_str("function vendored() {}\n")
            .unwrap();
        temp.child("src/notes.txt").write_str("ignored").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_init_writes_config_once() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(false);

        engine.init(Some(temp.path().to_path_buf()), false).await.unwrap();
        let config = temp.child(CONFIG_FILE);
        config.assert(predicate::path::exists());
        config.assert(predicate::str::contains("max_depth = 5"));

        config.write_str("# edited\n").unwrap();
        engine.init(Some(temp.path().to_path_buf()), false).await.unwrap();
        config.assert("# edited\n");

        engine.init(Some(temp.path().to_path_buf()), true).await.unwrap();
        config.assert(predicate::str::contains("[diagrams]"));
    }

    #[test]
    fn test_discovery_skips_ignored_and_unsupported() {
        let temp = project();
        let inputs = engine(false).discover(&[temp.path().join("src")]).unwrap();

        let names: Vec<_> = inputs
            .iter()
            .map(|i| i.path.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("src/game/Player.cs"), PathBuf::from("src/tools/build.py")]
        );
    }

    #[tokio::test]
    async fn test_generate_writes_documents() {
        let temp = project();
        let out = temp.child("docs");

        engine(true)
            .generate(Some(temp.path().join("src")), Some(out.path().to_path_buf()))
            .await
            .unwrap();

        let player = out.child("game/Player.cs.md");
        player.assert(predicate::str::starts_with("<!-- Generated by codelens"));
        player.assert(predicate::str::contains("### Class `Game.Player`"));
        player.assert(predicate::str::contains("The hero."));
        out.child("tools/build.py.md")
            .assert(predicate::str::contains("### `main`").and(predicate::str::contains("Calls `run`")));
        out.child("class_diagram.md")
            .assert(predicate::str::contains("Game_Actor <|-- Game_Player"));
        out.child("call_flow.md")
            .assert(predicate::str::contains("flowchart TD"));
        out.child("diagnostics.md").assert(predicate::path::exists());
        out.child("entity_graph.json")
            .assert(predicate::str::contains("\"Type::Game.Player\""));
        out.child("node_modules").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_diagram_to_file() {
        let temp = project();
        let target = temp.child("flow.mmd");

        engine(false)
            .diagram(
                vec![temp.path().join("src/tools")],
                ProjectionMode::CallFlow,
                Some("Function::main".to_string()),
                Some(1),
                Some(target.path().to_path_buf()),
            )
            .await
            .unwrap();

        target.assert("flowchart TD\n    main[\"main()\"]\n    run[\"run()\"]\n    main --> run\n");
    }

    #[tokio::test]
    async fn test_diagram_unknown_root_fails() {
        let temp = project();
        let result = engine(false)
            .diagram(
                vec![temp.path().join("src")],
                ProjectionMode::CallFlow,
                Some("Function::nowhere".to_string()),
                None,
                Some(temp.path().join("out.mmd")),
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_to_roots() {
        let roots = vec![PathBuf::from("/definitely/not/here")];
        assert_eq!(relative_to_roots(Path::new("a/b.md"), &roots), PathBuf::from("a/b.md"));
    }
}
