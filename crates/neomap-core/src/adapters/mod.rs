//! Concrete backends for the graph query service

pub mod neo4j_http;

pub use neo4j_http::Neo4jHttpBackend;
