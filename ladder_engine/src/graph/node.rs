use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Typed vertex kind in the A→C→V graph (§3). Mirrors the
/// `NodeKind::encode`/`decode` round-trip persistence pattern used elsewhere
/// in this codebase, since the snapshot format (§6) persists labels as
/// strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Topic,
    Stimulus,
    Idea,
    Attribute,
    Consequence,
    Value,
    Irrelevant,
}

impl NodeLabel {
    #[must_use]
    pub fn encode(self) -> &'static str {
        match self {
            NodeLabel::Topic => "TOPIC",
            NodeLabel::Stimulus => "STIMULUS",
            NodeLabel::Idea => "IDEA",
            NodeLabel::Attribute => "ATTRIBUTE",
            NodeLabel::Consequence => "CONSEQUENCE",
            NodeLabel::Value => "VALUE",
            NodeLabel::Irrelevant => "IRRELEVANT",
        }
    }

    #[must_use]
    pub fn decode(s: &str) -> Option<Self> {
        Some(match s {
            "TOPIC" => NodeLabel::Topic,
            "STIMULUS" => NodeLabel::Stimulus,
            "IDEA" => NodeLabel::Idea,
            "ATTRIBUTE" => NodeLabel::Attribute,
            "CONSEQUENCE" => NodeLabel::Consequence,
            "VALUE" => NodeLabel::Value,
            "IRRELEVANT" => NodeLabel::Irrelevant,
            _ => return None,
        })
    }

    /// Type hierarchy (§3 invariant): is an edge `self -> child` legal
    /// without needing an AUTO intermediate?
    #[must_use]
    pub fn permits_child(self, child: NodeLabel) -> bool {
        matches!(
            (self, child),
            (NodeLabel::Topic, NodeLabel::Stimulus)
                | (NodeLabel::Stimulus, NodeLabel::Idea)
                | (NodeLabel::Idea, NodeLabel::Attribute)
                | (NodeLabel::Attribute, NodeLabel::Consequence)
                | (NodeLabel::Consequence, NodeLabel::Consequence)
                | (NodeLabel::Consequence, NodeLabel::Value)
        ) || child == NodeLabel::Irrelevant
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Associates a node with the chat interaction that produced it. Purely
/// audit/debug metadata (§3): never consulted by graph semantics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceElement {
    pub interaction_id: Option<u64>,
    pub back_reference: Option<NodeId>,
}

/// A vertex in the interview graph. Parent/child linkage is stored as id
/// lists (insertion-ordered, deduplicated) rather than pointers, per the
/// arena-of-ids design note (§9).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub label: NodeLabel,
    pub conclusion: String,
    pub created_tick: u64,
    pub trace: Vec<TraceElement>,
    pub value_path_completed: bool,
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
    pub backwards_relations: Vec<NodeId>,
}

impl Node {
    pub(super) fn new(id: NodeId, label: NodeLabel, conclusion: String, created_tick: u64) -> Self {
        Self {
            id,
            label,
            conclusion,
            created_tick,
            trace: Vec::new(),
            value_path_completed: false,
            parents: Vec::new(),
            children: Vec::new(),
            backwards_relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.conclusion.starts_with(crate::graph::AUTO_NODE_PREFIX)
    }
}
