//! Priority Queue (C5): the worklist of nodes awaiting follow-up probing.

use crate::graph::{Graph, NodeLabel};
use crate::ids::NodeId;

/// Reports a forced advancement so the generator can prepend a transition
/// sentence (§4.5, §4.7).
#[derive(Clone, Debug)]
pub struct TopicSwitch {
    pub previous: NodeId,
    pub previous_conclusion: String,
    pub next: NodeId,
    pub next_conclusion: String,
}

/// Ordered worklist of STIMULUS/ATTRIBUTE/CONSEQUENCE nodes pending
/// probing (§4.5). The active node is tracked on the [`Graph`], not here.
#[derive(Debug, Default, Clone)]
pub struct Queue {
    entries: Vec<NodeId>,
    unchanged_count: u32,
    max_unchanged_count: usize,
}

impl Queue {
    #[must_use]
    pub fn new(max_unchanged_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            unchanged_count: 0,
            max_unchanged_count,
        }
    }

    /// Rebuilds a queue from a snapshot (§6).
    #[must_use]
    pub fn from_parts(entries: Vec<NodeId>, unchanged_count: u32, max_unchanged_count: usize) -> Self {
        Self {
            entries,
            unchanged_count,
            max_unchanged_count,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn unchanged_count(&self) -> u32 {
        self.unchanged_count
    }

    #[must_use]
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    /// Enqueues `id` if `label` is an enqueueable type (§4.5 invariant:
    /// only STIMULUS, ATTRIBUTE, CONSEQUENCE) and it is not already present.
    /// New CONSEQUENCE nodes go to the front; new ATTRIBUTE nodes are
    /// appended after the last ATTRIBUTE if any, else after the last
    /// CONSEQUENCE.
    pub fn enqueue(&mut self, graph: &Graph, id: NodeId, label: NodeLabel) {
        if !matches!(label, NodeLabel::Stimulus | NodeLabel::Attribute | NodeLabel::Consequence) {
            return;
        }
        if self.entries.contains(&id) {
            return;
        }
        match label {
            NodeLabel::Consequence => self.entries.insert(0, id),
            NodeLabel::Attribute => {
                let last_attr = self
                    .entries
                    .iter()
                    .rposition(|&e| graph.get(e).is_some_and(|n| n.label == NodeLabel::Attribute));
                let insert_at = match last_attr {
                    Some(i) => i + 1,
                    None => self
                        .entries
                        .iter()
                        .rposition(|&e| graph.get(e).is_some_and(|n| n.label == NodeLabel::Consequence))
                        .map_or(0, |i| i + 1),
                };
                self.entries.insert(insert_at, id);
            }
            _ => self.entries.push(id),
        }
    }

    /// Pops the front entry and sets it active on `graph`, removing any
    /// residual IRRELEVANT active node from the graph first (§4.5).
    pub fn advance(&mut self, graph: &mut Graph) -> Option<NodeId> {
        if let Some(active) = graph.active() {
            if active.label == NodeLabel::Irrelevant {
                let id = active.id;
                let _ = graph.remove_node(id);
            }
        }
        if self.entries.is_empty() {
            return None;
        }
        let next = self.entries.remove(0);
        graph.set_active(next);
        self.unchanged_count = 0;
        Some(next)
    }

    /// Call once per turn after the required-element test (§4.5, §4.6).
    /// `progressed=true` resets the retry counter; `false` increments it
    /// and, once the cap is reached, forces advancement and returns the
    /// resulting [`TopicSwitch`].
    pub fn record_turn_outcome(&mut self, graph: &mut Graph, progressed: bool) -> Option<TopicSwitch> {
        if progressed {
            self.unchanged_count = 0;
            return None;
        }
        self.unchanged_count += 1;
        if (self.unchanged_count as usize) < self.max_unchanged_count {
            return None;
        }
        let previous = graph.active()?;
        let previous_id = previous.id;
        let previous_conclusion = previous.conclusion.clone();
        let next = self.advance(graph)?;
        let next_conclusion = graph.get(next).map(|n| n.conclusion.clone()).unwrap_or_default();
        Some(TopicSwitch {
            previous: previous_id,
            previous_conclusion,
            next,
            next_conclusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_consequence_goes_to_front() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a = g.add_child(idea, NodeLabel::Attribute, "a").unwrap();
        let c1 = g.add_child(a, NodeLabel::Consequence, "c1").unwrap();
        let c2 = g.add_child(a, NodeLabel::Consequence, "c2").unwrap();
        let mut q = Queue::new(3);
        q.enqueue(&g, c1, NodeLabel::Consequence);
        q.enqueue(&g, c2, NodeLabel::Consequence);
        assert_eq!(q.entries(), &[c2, c1]);
    }

    #[test]
    fn new_attribute_appends_after_last_attribute() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a1 = g.add_child(idea, NodeLabel::Attribute, "a1").unwrap();
        let c1 = g.add_child(a1, NodeLabel::Consequence, "c1").unwrap();
        let a2 = g.add_child(idea, NodeLabel::Attribute, "a2").unwrap();
        let mut q = Queue::new(3);
        q.enqueue(&g, c1, NodeLabel::Consequence);
        q.enqueue(&g, a1, NodeLabel::Attribute);
        q.enqueue(&g, a2, NodeLabel::Attribute);
        assert_eq!(q.entries(), &[c1, a1, a2]);
    }

    #[test]
    fn record_turn_outcome_forces_advancement_at_cap() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a1 = g.add_child(idea, NodeLabel::Attribute, "a1").unwrap();
        let a2 = g.add_child(idea, NodeLabel::Attribute, "a2").unwrap();
        let mut q = Queue::new(2);
        q.enqueue(&g, a2, NodeLabel::Attribute);
        g.set_active(a1);
        assert!(q.record_turn_outcome(&mut g, false).is_none());
        let switch = q.record_turn_outcome(&mut g, false).unwrap();
        assert_eq!(switch.previous, a1);
        assert_eq!(switch.next, a2);
        assert_eq!(g.active_id(), Some(a2));
    }
}
