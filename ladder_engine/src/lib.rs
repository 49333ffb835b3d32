//! # ladder-engine: laddering-interview engine
//!
//! A typed A-C-V (Attribute-Consequence-Value) graph store, LLM-mediated
//! element classification, and stage-driven question generation for
//! means-end laddering interviews.
//!
//! ## Core concepts
//!
//! - **Graph** (C1): an arena of nodes addressed by stable [`ids::NodeId`],
//!   one per stimulus, rooted at a STIMULUS node.
//! - **Similarity Oracle** (C2): lexical-then-LLM judgement deciding whether
//!   a newly classified element matches an existing node.
//! - **Element Analyzer** (C3): classifies an utterance into ACV elements
//!   and the causal relations between them.
//! - **Tree Updater** (C4): applies one turn's classified elements to the
//!   graph via grafting, deduplication, and IRRELEVANT handling.
//! - **Priority Queue** (C5): drives which node becomes active next.
//! - **Stage Controller** (C6): the interview-stage state machine.
//! - **Question Generator** (C7): renders a template and asks the LLM for
//!   the next question.
//! - **Session Manager**: orchestrates C1-C7 per session, persisting
//!   snapshots through a pluggable store.
//!
//! ## Quick start
//!
//! ```
//! use ladder_engine::graph::{Graph, NodeLabel};
//!
//! let mut graph = Graph::new_for_stimulus("offline playback");
//! let root = graph.root_id();
//! let idea = graph.add_child(root, NodeLabel::Idea, "save playlists for offline use").unwrap();
//! graph.set_active(idea);
//! assert_eq!(graph.active_id(), Some(idea));
//! ```

pub mod analyzer;
pub mod config;
pub mod errors;
pub mod generator;
pub mod graph;
pub mod http;
pub mod ids;
pub mod llm;
pub mod queue;
pub mod session;
pub mod similarity;
pub mod stage;
pub mod store;
pub mod updater;

pub use errors::EngineError;
pub use graph::{Graph, Node, NodeLabel};
pub use ids::NodeId;
pub use session::{Session, SessionManager};
