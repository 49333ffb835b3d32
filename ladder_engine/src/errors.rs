//! Crate-wide error types.
//!
//! Each module family gets its own `thiserror`-derived enum so call sites can
//! match on the specific failure they care about. [`EngineError`] aggregates
//! them behind one `miette::Diagnostic` for the binary entry points and
//! integration tests, following the same "narrow per-module error, one
//! umbrella at the edges" shape the rest of this codebase uses.

use miette::Diagnostic;
use thiserror::Error;

use crate::ids::NodeId;

/// Errors raised by the graph store (C1).
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node {0} not found in graph")]
    #[diagnostic(code(ladder_engine::graph::missing_node))]
    MissingNode(NodeId),

    #[error("adding {child} under {parent} would create a cycle")]
    #[diagnostic(
        code(ladder_engine::graph::cycle),
        help("the candidate is already an ancestor of the target; the edge was skipped")
    )]
    WouldCreateCycle { parent: NodeId, child: NodeId },

    #[error("node {0} is not IRRELEVANT and cannot be removed")]
    #[diagnostic(code(ladder_engine::graph::illegal_removal))]
    IllegalRemoval(NodeId),

    #[error("no active node is set on the graph")]
    #[diagnostic(code(ladder_engine::graph::no_active_node))]
    NoActiveNode,
}

/// Errors raised by the LLM provider collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("LLM transport failure: {0}")]
    #[diagnostic(code(ladder_engine::llm::transport))]
    Transport(String),

    #[error("LLM returned a response that could not be parsed as JSON even after repair: {0}")]
    #[diagnostic(
        code(ladder_engine::llm::unparsable),
        help("treated as a classification failure per the engine's error policy")
    )]
    Unparsable(String),

    #[error("LLM response did not match the expected schema: {0}")]
    #[diagnostic(code(ladder_engine::llm::schema_mismatch))]
    SchemaMismatch(String),
}

/// Errors raised by the persistent session store.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("session {0} not found")]
    #[diagnostic(code(ladder_engine::store::not_found))]
    NotFound(String),

    #[error("snapshot for session {session_id} failed to deserialize: {source}")]
    #[diagnostic(
        code(ladder_engine::store::corrupt_snapshot),
        help("the prior snapshot is left untouched on disk; the session is treated as fresh")
    )]
    CorruptSnapshot {
        session_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend error: {0}")]
    #[diagnostic(code(ladder_engine::store::backend))]
    Backend(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Errors raised while advancing the interview stage machine (C6).
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("transition from {from:?} to {to:?} is not in the transition table")]
    #[diagnostic(
        code(ladder_engine::stage::invalid_transition),
        help("the transition was denied; stage state is preserved")
    )]
    InvalidTransition { from: String, to: String },
}

/// Top-level umbrella used at process edges (HTTP handlers, CLI, integration tests).
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),

    #[error("session {0} is locked by a concurrent turn")]
    #[diagnostic(code(ladder_engine::session::contended))]
    SessionContended(String),
}
