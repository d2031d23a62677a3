//! Test doubles for the backend, renderer and form collaborators

pub mod fakes;

pub use fakes::{
    node_row, relationship_row, triple_row, FakeGraphBackend, RecordingFormPresenter,
    RecordingRenderer, RenderCall, ResponseGate,
};
