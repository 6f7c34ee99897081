mod builder;
pub mod diagnostics;
mod engine;
pub mod languages;
pub mod model;
mod parser;
mod pipeline;
mod projector;
mod renderer;
mod resolver;

pub use projector::ProjectionMode;

// Export the main engine
pub use engine::Engine;
