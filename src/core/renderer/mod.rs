//! Document rendering: Markdown pages through tera, diagrams as Mermaid

mod markdown;
mod mermaid;
mod templates;

pub use markdown::{doc_path, DocRenderer};
pub use mermaid::MermaidRenderer;
