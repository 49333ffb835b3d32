//! Stage Controller (C6): the interview-stage state machine. The
//! transition table is expressed as data (§9, §4.6) so it is unit-testable
//! independent of the rest of the controller.

use tracing::{instrument, warn};

use crate::errors::StageError;
use crate::graph::{Graph, NodeLabel};
use crate::ids::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Initial,
    AskingForIdea,
    AskingForAttributes,
    AskingForConsequences,
    AskingForConsequencesOrValues,
    AskingAgainForAttributes,
    AskingAgainForAttributesTooShort,
    ValuesLimitReached,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Initial => "INITIAL",
            Stage::AskingForIdea => "ASKING_FOR_IDEA",
            Stage::AskingForAttributes => "ASKING_FOR_ATTRIBUTES",
            Stage::AskingForConsequences => "ASKING_FOR_CONSEQUENCES",
            Stage::AskingForConsequencesOrValues => "ASKING_FOR_CONSEQUENCES_OR_VALUES",
            Stage::AskingAgainForAttributes => "ASKING_AGAIN_FOR_ATTRIBUTES",
            Stage::AskingAgainForAttributesTooShort => "ASKING_AGAIN_FOR_ATTRIBUTES_TOO_SHORT",
            Stage::ValuesLimitReached => "VALUES_LIMIT_REACHED",
            Stage::Complete => "COMPLETE",
        };
        write!(f, "{s}")
    }
}

/// The transition table from §4.6, expressed as data. `VALUES_LIMIT_REACHED`
/// is reachable unconditionally from every stage (the gate has absolute
/// priority) and is therefore not listed per-row; callers consult
/// [`Stage::ValuesLimitReached`] via the gate check before this table.
fn allowed_targets(from: Stage) -> &'static [Stage] {
    use Stage::*;
    match from {
        Initial => &[AskingForIdea],
        AskingForIdea => &[AskingForAttributes, Complete],
        AskingForAttributes => &[
            AskingForConsequences,
            AskingAgainForAttributes,
            AskingAgainForAttributesTooShort,
            Complete,
            ValuesLimitReached,
        ],
        AskingForConsequences => &[
            AskingForConsequencesOrValues,
            AskingAgainForAttributes,
            Complete,
            ValuesLimitReached,
        ],
        AskingForConsequencesOrValues => &[
            AskingForConsequencesOrValues,
            AskingAgainForAttributes,
            Complete,
            ValuesLimitReached,
        ],
        AskingAgainForAttributes => &[
            AskingForAttributes,
            Complete,
            ValuesLimitReached,
            AskingAgainForAttributesTooShort,
        ],
        AskingAgainForAttributesTooShort => &[
            Complete,
            ValuesLimitReached,
            AskingForConsequencesOrValues,
            AskingAgainForAttributes,
        ],
        ValuesLimitReached | Complete => &[],
    }
}

/// Parses a stage's encoded form back into a [`Stage`] (snapshot
/// round-trip, §6).
#[must_use]
pub fn decode_stage(s: &str) -> Option<Stage> {
    Some(match s {
        "INITIAL" => Stage::Initial,
        "ASKING_FOR_IDEA" => Stage::AskingForIdea,
        "ASKING_FOR_ATTRIBUTES" => Stage::AskingForAttributes,
        "ASKING_FOR_CONSEQUENCES" => Stage::AskingForConsequences,
        "ASKING_FOR_CONSEQUENCES_OR_VALUES" => Stage::AskingForConsequencesOrValues,
        "ASKING_AGAIN_FOR_ATTRIBUTES" => Stage::AskingAgainForAttributes,
        "ASKING_AGAIN_FOR_ATTRIBUTES_TOO_SHORT" => Stage::AskingAgainForAttributesTooShort,
        "VALUES_LIMIT_REACHED" => Stage::ValuesLimitReached,
        "COMPLETE" => Stage::Complete,
        _ => return None,
    })
}

#[must_use]
pub fn is_valid_transition(from: Stage, to: Stage) -> bool {
    from == to || allowed_targets(from).contains(&to)
}

/// Required-element test (§4.6): has the active node's chain produced what
/// it needs to progress?
#[must_use]
pub fn required_element_present(graph: &Graph, active: NodeId, active_label: NodeLabel) -> bool {
    match active_label {
        NodeLabel::Idea => {
            let has_attribute = graph
                .descendants(active)
                .iter()
                .any(|&d| graph.get(d).is_some_and(|n| n.label == NodeLabel::Attribute));
            has_attribute
                || graph.descendants(active).iter().any(|&d| {
                    graph
                        .get(d)
                        .is_some_and(|n| matches!(n.label, NodeLabel::Consequence | NodeLabel::Value))
                })
        }
        NodeLabel::Attribute => {
            let descendants = graph.descendants(active);
            descendants
                .iter()
                .any(|&d| graph.get(d).is_some_and(|n| n.label == NodeLabel::Consequence))
                || descendants
                    .iter()
                    .any(|&d| graph.get(d).is_some_and(|n| n.label == NodeLabel::Value))
        }
        NodeLabel::Consequence => graph
            .descendants(active)
            .iter()
            .any(|&d| graph.get(d).is_some_and(|n| matches!(n.label, NodeLabel::Consequence | NodeLabel::Value))),
        NodeLabel::Irrelevant => graph
            .descendants(active)
            .iter()
            .any(|&d| graph.get(d).is_some_and(|n| n.label != NodeLabel::Irrelevant)),
        _ => true,
    }
}

/// Values-limit gate (§4.6): has absolute priority over any other
/// transition.
#[must_use]
pub fn values_limit_tripped(value_count: usize, n_values_max: i64) -> bool {
    n_values_max > 0 && value_count as i64 >= n_values_max
}

/// Inputs the Session Manager gathers before asking the controller to
/// advance (§4.6).
#[derive(Clone, Copy, Debug)]
pub struct AdvanceContext {
    pub required_element_satisfied: bool,
    pub queue_empty: bool,
    pub values_limit_tripped: bool,
    pub real_node_produced_this_round: bool,
    pub node_count: usize,
    pub min_nodes: usize,
}

#[derive(Clone, Debug)]
pub struct StageController {
    stage: Stage,
    asked_again_for_attributes: bool,
}

impl Default for StageController {
    fn default() -> Self {
        Self::new()
    }
}

impl StageController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Initial,
            asked_again_for_attributes: false,
        }
    }

    /// Reconstructs a controller from a snapshot's saved stage (§6).
    #[must_use]
    pub fn from_parts(stage: Stage, asked_again_for_attributes: bool) -> Self {
        Self {
            stage,
            asked_again_for_attributes,
        }
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn asked_again_for_attributes(&self) -> bool {
        self.asked_again_for_attributes
    }

    /// Computes and commits the next stage, or denies the transition and
    /// preserves state (§7: "Invalid stage transition requested: logged,
    /// transition denied, state preserved").
    #[instrument(skip(self, ctx), fields(from = %self.stage), err)]
    pub fn advance(&mut self, ctx: AdvanceContext) -> Result<Stage, StageError> {
        let target = self.decide(ctx);
        self.commit(target)
    }

    fn decide(&mut self, ctx: AdvanceContext) -> Stage {
        if ctx.values_limit_tripped {
            return Stage::ValuesLimitReached;
        }

        match self.stage {
            Stage::Initial => Stage::AskingForIdea,
            Stage::AskingForIdea => {
                if ctx.required_element_satisfied {
                    Stage::AskingForAttributes
                } else {
                    Stage::Complete
                }
            }
            Stage::AskingForAttributes | Stage::AskingForConsequences | Stage::AskingForConsequencesOrValues => {
                if !ctx.queue_empty {
                    if ctx.required_element_satisfied {
                        match self.stage {
                            Stage::AskingForAttributes => Stage::AskingForConsequences,
                            _ => Stage::AskingForConsequencesOrValues,
                        }
                    } else {
                        self.stage
                    }
                } else if !self.asked_again_for_attributes {
                    self.asked_again_for_attributes = true;
                    Stage::AskingAgainForAttributes
                } else {
                    Stage::Complete
                }
            }
            Stage::AskingAgainForAttributes => {
                if ctx.required_element_satisfied {
                    Stage::AskingForAttributes
                } else if !ctx.real_node_produced_this_round && ctx.node_count < ctx.min_nodes {
                    Stage::AskingAgainForAttributesTooShort
                } else {
                    Stage::Complete
                }
            }
            Stage::AskingAgainForAttributesTooShort => {
                if ctx.required_element_satisfied {
                    Stage::AskingForConsequencesOrValues
                } else if !ctx.queue_empty {
                    Stage::AskingAgainForAttributes
                } else {
                    Stage::Complete
                }
            }
            Stage::ValuesLimitReached | Stage::Complete => self.stage,
        }
    }

    fn commit(&mut self, target: Stage) -> Result<Stage, StageError> {
        if !is_valid_transition(self.stage, target) {
            warn!(from = %self.stage, to = %target, "stage transition denied");
            return Err(StageError::InvalidTransition {
                from: self.stage.to_string(),
                to: target.to_string(),
            });
        }
        self.stage = target;
        Ok(self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_spec_rows() {
        assert!(is_valid_transition(Stage::Initial, Stage::AskingForIdea));
        assert!(!is_valid_transition(Stage::Initial, Stage::Complete));
        assert!(is_valid_transition(
            Stage::AskingForAttributes,
            Stage::ValuesLimitReached
        ));
        assert!(is_valid_transition(
            Stage::AskingForConsequencesOrValues,
            Stage::AskingForConsequencesOrValues
        ));
    }

    #[test]
    fn values_limit_gate_has_priority() {
        let mut controller = StageController::new();
        controller.advance(AdvanceContext {
            required_element_satisfied: true,
            queue_empty: false,
            values_limit_tripped: false,
            real_node_produced_this_round: true,
            node_count: 5,
            min_nodes: 3,
        }).unwrap();
        let stage = controller
            .advance(AdvanceContext {
                required_element_satisfied: false,
                queue_empty: false,
                values_limit_tripped: true,
                real_node_produced_this_round: true,
                node_count: 5,
                min_nodes: 3,
            })
            .unwrap();
        assert_eq!(stage, Stage::ValuesLimitReached);
    }

    #[test]
    fn attribute_replay_gives_one_more_chance() {
        let mut controller = StageController::new();
        controller.advance(AdvanceContext {
            required_element_satisfied: true,
            queue_empty: false,
            values_limit_tripped: false,
            real_node_produced_this_round: true,
            node_count: 2,
            min_nodes: 3,
        }).unwrap(); // -> AskingForAttributes
        let stage = controller
            .advance(AdvanceContext {
                required_element_satisfied: false,
                queue_empty: true,
                values_limit_tripped: false,
                real_node_produced_this_round: false,
                node_count: 2,
                min_nodes: 3,
            })
            .unwrap();
        assert_eq!(stage, Stage::AskingAgainForAttributes);
        assert!(controller.asked_again_for_attributes());
    }
}
