//! Graph Store (C1): a typed, multi-parent DAG of interview elements.
//!
//! Grounded on the arena-of-stable-ids shape this codebase already uses for
//! its versioned channels (`state.rs`'s `FxHashMap`-backed structures) and
//! on the `NodeKind::encode`/`decode` round-trip pattern (`types.rs`) for
//! [`NodeLabel`]'s serialized form. Unlike the teacher's executable-node
//! graph (`graphs::GraphBuilder`), this is a graph of *content*, not of
//! code: nodes are data, never `Arc<dyn Node>`.

mod export;
mod node;

pub use export::ExportedTree;
pub use node::{Node, NodeLabel, TraceElement};

use rustc_hash::FxHashMap;

use crate::errors::GraphError;
use crate::ids::NodeId;

/// Reserved prefix the Tree Updater stamps on AUTO-generated intermediate
/// nodes (§4.4) so exports and prompts can filter them back out.
pub const AUTO_NODE_PREFIX: &str = "AUTO-";

/// Owns every node reachable from a session's stimuli. One `Graph` per chat
/// handler (§3: "each owning: a Graph, a Queue, ...").
#[derive(Debug, Clone)]
pub struct Graph {
    arena: FxHashMap<NodeId, Node>,
    label_index: FxHashMap<NodeLabel, Vec<NodeId>>,
    root_id: NodeId,
    active_id: Option<NodeId>,
    clock: u64,
}

impl Graph {
    /// Creates a graph rooted at a single STIMULUS node.
    #[must_use]
    pub fn new_for_stimulus(stimulus: &str) -> Self {
        let mut graph = Self {
            arena: FxHashMap::default(),
            label_index: FxHashMap::default(),
            root_id: NodeId::new(),
            active_id: None,
            clock: 0,
        };
        let root_id = graph.root_id;
        let root = Node::new(root_id, NodeLabel::Stimulus, stimulus.to_string(), 0);
        graph.arena.insert(root_id, root);
        graph
            .label_index
            .entry(NodeLabel::Stimulus)
            .or_default()
            .push(root_id);
        graph.active_id = Some(root_id);
        graph
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(&id)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(&id)
    }

    #[must_use]
    pub fn active(&self) -> Option<&Node> {
        self.active_id.and_then(|id| self.arena.get(&id))
    }

    #[must_use]
    pub fn active_id(&self) -> Option<NodeId> {
        self.active_id
    }

    pub fn set_active(&mut self, id: NodeId) {
        self.active_id = Some(id);
    }

    /// Grafts a brand new child under `parent`. Updates the label index and
    /// assigns the next monotonic creation tick.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        label: NodeLabel,
        conclusion: impl Into<String>,
    ) -> Result<NodeId, GraphError> {
        if !self.arena.contains_key(&parent) {
            return Err(GraphError::MissingNode(parent));
        }
        let tick = self.next_tick();
        let id = NodeId::new();
        let node = Node::new(id, label, conclusion.into(), tick);
        self.arena.insert(id, node);
        self.label_index.entry(label).or_default().push(id);
        self.link(parent, id)?;
        Ok(id)
    }

    /// Links an already-existing node as a child of `parent`. No-op if the
    /// edge already exists or would close a cycle (§4.1, §4.4 cycle
    /// prevention: "assert the candidate is not already an ancestor of the
    /// target").
    pub fn add_existing_as_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<bool, GraphError> {
        if !self.arena.contains_key(&parent) || !self.arena.contains_key(&child) {
            return Err(GraphError::MissingNode(parent));
        }
        if parent == child {
            return Ok(false);
        }
        if self
            .get(parent)
            .is_some_and(|p| p.children.contains(&child))
        {
            return Ok(false);
        }
        if self.is_ancestor_of(child, parent) {
            return Err(GraphError::WouldCreateCycle { parent, child });
        }
        self.link(parent, child)?;
        Ok(true)
    }

    fn link(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        let tick = self.arena.get(&parent).map(|p| p.created_tick).unwrap_or(0);
        let _ = tick;
        if let Some(p) = self.get_mut(parent) {
            if !p.children.contains(&child) {
                p.children.push(child);
            }
        }
        if let Some(c) = self.get_mut(child) {
            if !c.parents.contains(&parent) {
                c.parents.push(parent);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn nodes_by_label(&self, label: NodeLabel) -> Vec<NodeId> {
        self.label_index.get(&label).cloned().unwrap_or_default()
    }

    /// BFS over parents from `start` to the root, deduplicated, nearest
    /// first.
    #[must_use]
    pub fn path_to_root(&self, start: NodeId) -> Vec<NodeId> {
        let mut visited = rustc_hash::FxHashSet::default();
        let mut order = Vec::new();
        let mut frontier = vec![start];
        while let Some(id) = frontier.pop() {
            if !visited.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(node) = self.get(id) {
                for &parent in &node.parents {
                    frontier.push(parent);
                }
            }
        }
        order
    }

    /// The parent with the greatest creation tick ("latest parent", §3).
    #[must_use]
    pub fn latest_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        node.parents
            .iter()
            .filter_map(|&p| self.get(p).map(|n| (p, n.created_tick)))
            .max_by_key(|(_, tick)| *tick)
            .map(|(p, _)| p)
    }

    /// True if `a` is a (possibly indirect) ancestor of `b`.
    #[must_use]
    pub fn is_ancestor_of(&self, a: NodeId, b: NodeId) -> bool {
        self.path_to_root(b).into_iter().any(|id| id == a)
    }

    /// True if `descendant` is transitively reachable as a child of
    /// `ancestor` (used by the required-element test, §4.6).
    #[must_use]
    pub fn is_descendant_of(&self, descendant: NodeId, ancestor: NodeId) -> bool {
        self.is_ancestor_of(ancestor, descendant)
    }

    /// Depth-first walk of all transitive children of `id`.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut visited = rustc_hash::FxHashSet::default();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.get(id).map(|n| n.children.clone()).unwrap_or_default();
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                continue;
            }
            out.push(cur);
            if let Some(n) = self.get(cur) {
                stack.extend(n.children.iter().copied());
            }
        }
        out
    }

    /// Only legal for IRRELEVANT nodes (§4.1). Removes the node from its
    /// parents' child lists, the label index, and the arena.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        let label = self
            .get(id)
            .map(|n| n.label)
            .ok_or(GraphError::MissingNode(id))?;
        if label != NodeLabel::Irrelevant {
            return Err(GraphError::IllegalRemoval(id));
        }
        let parents = self.get(id).map(|n| n.parents.clone()).unwrap_or_default();
        for parent in parents {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        self.arena.remove(&id);
        if let Some(list) = self.label_index.get_mut(&label) {
            list.retain(|n| *n != id);
        }
        if self.active_id == Some(id) {
            self.active_id = None;
        }
        Ok(())
    }

    /// Iterative upward DFS marking every ancestor of `value_id` as having
    /// completed a value path (§3 invariant 4).
    pub fn mark_value_path_completed(&mut self, value_id: NodeId) {
        let mut stack = vec![value_id];
        let mut visited = rustc_hash::FxHashSet::default();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let parents = if let Some(node) = self.get_mut(id) {
                node.value_path_completed = true;
                node.parents.clone()
            } else {
                continue;
            };
            stack.extend(parents);
        }
    }

    pub fn add_backwards_relation(&mut self, on: NodeId, target: NodeId) {
        if let Some(node) = self.get_mut(on) {
            if !node.backwards_relations.contains(&target) {
                node.backwards_relations.push(target);
            }
        }
    }

    pub fn set_conclusion(&mut self, id: NodeId, conclusion: impl Into<String>) {
        if let Some(node) = self.get_mut(id) {
            node.conclusion = conclusion.into();
        }
    }

    /// Rewrites a node's label in place, updating the label index (used
    /// when transforming an IRRELEVANT dummy into its resolved label,
    /// §4.4).
    pub fn set_label(&mut self, id: NodeId, label: NodeLabel) {
        let Some(old_label) = self.get(id).map(|n| n.label) else {
            return;
        };
        if old_label == label {
            return;
        }
        if let Some(list) = self.label_index.get_mut(&old_label) {
            list.retain(|n| *n != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.label = label;
        }
        self.label_index.entry(label).or_default().push(id);
    }

    pub fn push_trace(&mut self, id: NodeId, trace: TraceElement) {
        if let Some(node) = self.get_mut(id) {
            node.trace.push(trace);
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn all_ids(&self) -> Vec<NodeId> {
        self.arena.keys().copied().collect()
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.arena.values().cloned().collect()
    }

    /// Rebuilds a `Graph` from a flat node list (snapshot deserialization,
    /// §6). The clock is restored to one past the greatest creation tick
    /// so future grafts keep the monotonic ordering.
    #[must_use]
    pub fn from_parts(root_id: NodeId, active_id: Option<NodeId>, nodes: Vec<Node>) -> Self {
        let mut arena = FxHashMap::default();
        let mut label_index: FxHashMap<NodeLabel, Vec<NodeId>> = FxHashMap::default();
        let mut clock = 0;
        for node in nodes {
            clock = clock.max(node.created_tick);
            label_index.entry(node.label).or_default().push(node.id);
            arena.insert(node.id, node);
        }
        Self {
            arena,
            label_index,
            root_id,
            active_id,
            clock,
        }
    }

    /// Re-parents `child`'s linkage away from `old_parent` onto `new_parent`.
    /// Used when transforming an IRRELEVANT dummy in place (§4.4).
    pub fn reparent(
        &mut self,
        child: NodeId,
        old_parent: Option<NodeId>,
        new_parent: NodeId,
    ) -> Result<(), GraphError> {
        if let Some(old) = old_parent {
            if let Some(p) = self.get_mut(old) {
                p.children.retain(|c| *c != child);
            }
            if let Some(c) = self.get_mut(child) {
                c.parents.retain(|p| *p != old);
            }
        }
        self.link(new_parent, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_child_updates_label_index_and_edges() {
        let mut g = Graph::new_for_stimulus("offline playback");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "save playlists").unwrap();
        assert_eq!(g.nodes_by_label(NodeLabel::Idea), vec![idea]);
        assert!(g.get(root).unwrap().children.contains(&idea));
        assert!(g.get(idea).unwrap().parents.contains(&root));
    }

    #[test]
    fn add_existing_as_child_rejects_cycles() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let attr = g.add_child(idea, NodeLabel::Attribute, "a").unwrap();
        let err = g.add_existing_as_child(attr, idea).unwrap_err();
        assert!(matches!(err, GraphError::WouldCreateCycle { .. }));
    }

    #[test]
    fn latest_parent_picks_greatest_tick() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a1 = g.add_child(idea, NodeLabel::Attribute, "a1").unwrap();
        let c = g.add_child(a1, NodeLabel::Consequence, "c").unwrap();
        let a2 = g.add_child(idea, NodeLabel::Attribute, "a2").unwrap();
        g.add_existing_as_child(a2, c).unwrap();
        assert_eq!(g.latest_parent(c), Some(a2));
    }

    #[test]
    fn mark_value_path_completed_walks_all_ancestors() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a = g.add_child(idea, NodeLabel::Attribute, "a").unwrap();
        let c = g.add_child(a, NodeLabel::Consequence, "c").unwrap();
        let v = g.add_child(c, NodeLabel::Value, "v").unwrap();
        g.mark_value_path_completed(v);
        for id in [idea, a, c, v, root] {
            assert!(g.get(id).unwrap().value_path_completed, "{id} not marked");
        }
    }

    #[test]
    fn remove_node_only_legal_for_irrelevant() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        assert!(matches!(
            g.remove_node(idea).unwrap_err(),
            GraphError::IllegalRemoval(_)
        ));
        let irr = g.add_child(root, NodeLabel::Irrelevant, "hmm").unwrap();
        g.remove_node(irr).unwrap();
        assert!(g.get(irr).is_none());
    }
}
