//! Seams to the collaborators outside the core: backend, renderer, forms

pub mod graph_backend;
pub mod renderer;

pub use graph_backend::GraphBackend;
pub use renderer::{DiagramRenderer, NodeFormPresenter, RenderHint, Notice, NoticeLevel};
