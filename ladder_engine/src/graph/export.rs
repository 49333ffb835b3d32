//! Export-time reorganization of backwards relations into forward edges
//! (§4.1). This is output-only: it runs against a clone of the arena and
//! never mutates the live [`super::Graph`].

use rustc_hash::FxHashMap;

use super::{Graph, Node, NodeLabel};
use crate::ids::NodeId;

/// A flattened, export-ready view of a [`Graph`] with backwards relations
/// resolved into forward parent/child edges.
#[derive(Debug, Clone)]
pub struct ExportedTree {
    pub root_id: NodeId,
    pub active_id: Option<NodeId>,
    pub nodes: Vec<Node>,
}

impl Graph {
    /// Produces the export view described in §4.1: non-IDEA nodes carrying
    /// backwards relations reparent their target away from any IDEA
    /// ancestor onto themselves; IDEA nodes are processed last and
    /// re-attach their own recorded attributes as forward children.
    #[must_use]
    pub fn export(&self) -> ExportedTree {
        let mut working: FxHashMap<NodeId, Node> =
            self.arena.iter().map(|(id, n)| (*id, n.clone())).collect();

        // Pass 1: non-IDEA holders of backwards relations steal their target
        // away from an IDEA parent.
        let non_idea_holders: Vec<NodeId> = working
            .values()
            .filter(|n| n.label != NodeLabel::Idea && !n.backwards_relations.is_empty())
            .map(|n| n.id)
            .collect();

        for holder in non_idea_holders {
            let targets = working
                .get(&holder)
                .map(|n| n.backwards_relations.clone())
                .unwrap_or_default();
            for target in targets {
                let idea_parent = working.get(&target).and_then(|t| {
                    t.parents.iter().copied().find(|p| {
                        working
                            .get(p)
                            .is_some_and(|pn| pn.label == NodeLabel::Idea)
                    })
                });
                if let Some(idea_parent) = idea_parent {
                    if let Some(p) = working.get_mut(&idea_parent) {
                        p.children.retain(|c| *c != target);
                    }
                    if let Some(t) = working.get_mut(&target) {
                        t.parents.retain(|p| *p != idea_parent);
                    }
                }
                link(&mut working, holder, target);
            }
        }

        // Pass 2: IDEA nodes re-attach their recorded attributes as forward
        // children (additive — does not steal from whoever pass 1 assigned).
        let idea_holders: Vec<NodeId> = working
            .values()
            .filter(|n| n.label == NodeLabel::Idea && !n.backwards_relations.is_empty())
            .map(|n| n.id)
            .collect();

        for idea in idea_holders {
            let targets = working
                .get(&idea)
                .map(|n| n.backwards_relations.clone())
                .unwrap_or_default();
            for target in targets {
                link(&mut working, idea, target);
            }
        }

        ExportedTree {
            root_id: self.root_id,
            active_id: self.active_id,
            nodes: working.into_values().collect(),
        }
    }
}

fn link(working: &mut FxHashMap<NodeId, Node>, parent: NodeId, child: NodeId) {
    if let Some(p) = working.get_mut(&parent) {
        if !p.children.contains(&child) {
            p.children.push(child);
        }
    }
    if let Some(c) = working.get_mut(&child) {
        if !c.parents.contains(&parent) {
            c.parents.push(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backwards_relation_reparents_onto_holder() {
        let mut g = Graph::new_for_stimulus("s");
        let root = g.root_id();
        let idea = g.add_child(root, NodeLabel::Idea, "i").unwrap();
        let a = g.add_child(idea, NodeLabel::Attribute, "a").unwrap();
        let c = g.add_child(a, NodeLabel::Consequence, "c").unwrap();
        // Simulate A discovered while active is C: recorded as a backwards
        // relation on C, pointing at the A uttered after it.
        let late_a = g.add_child(idea, NodeLabel::Attribute, "late-a").unwrap();
        g.add_backwards_relation(c, late_a);

        let exported = g.export();
        let c_node = exported.nodes.iter().find(|n| n.id == c).unwrap();
        assert!(c_node.children.contains(&late_a));
        let idea_node = exported.nodes.iter().find(|n| n.id == idea).unwrap();
        assert!(!idea_node.children.contains(&late_a));
    }
}
