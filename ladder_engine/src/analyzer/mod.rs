//! Element Analyzer (C3): classifies a user utterance into typed elements
//! and causal relations via the LLM collaborator.

use serde::Deserialize;
use tracing::instrument;

use crate::errors::LlmError;
use crate::graph::NodeLabel;
use crate::llm::{chat_json, ChatMessage, ChatRequest, LlmProvider, ResponseFormatStrategy};

/// Result of the first-content-message idea check (§4.3), run only when
/// the stage is `ASKING_FOR_IDEA`.
#[derive(Clone, Debug)]
pub struct IdeaCheck {
    pub is_idea: bool,
    pub is_relevant: bool,
    /// Bounded to 4-6 words by the prompt; not re-validated here since the
    /// idea check's summary never feeds the 10/3-char drop rule (§4.3
    /// applies only to multi-element summaries).
    pub summary: String,
}

/// One element extracted from an utterance (§4.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzedElement {
    pub category: NodeLabel,
    pub summary: String,
    pub text_segment: String,
    pub is_new_element: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationType {
    AttributeToConsequence,
    ConsequenceToConsequence,
    ConsequenceToValue,
}

impl RelationType {
    fn from_token(s: &str) -> Option<Self> {
        match s {
            "A->C" => Some(RelationType::AttributeToConsequence),
            "C->C" => Some(RelationType::ConsequenceToConsequence),
            "C->V" => Some(RelationType::ConsequenceToValue),
            _ => None,
        }
    }

    /// The (source, target) labels this relation type requires, used to
    /// discard relations whose classified endpoints don't match (§4.3:
    /// "validates indices and relation-type/label consistency").
    fn expected_labels(self) -> (NodeLabel, NodeLabel) {
        match self {
            RelationType::AttributeToConsequence => (NodeLabel::Attribute, NodeLabel::Consequence),
            RelationType::ConsequenceToConsequence => (NodeLabel::Consequence, NodeLabel::Consequence),
            RelationType::ConsequenceToValue => (NodeLabel::Consequence, NodeLabel::Value),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CausalRelation {
    pub source_index: usize,
    pub target_index: usize,
    pub relation_type: RelationType,
    #[allow(dead_code)]
    pub explanation: String,
}

#[derive(Clone, Debug, Default)]
pub struct AnalysisResult {
    pub elements: Vec<AnalyzedElement>,
    pub relations: Vec<CausalRelation>,
}

#[derive(Deserialize)]
struct RawIdeaCheck {
    is_idea: bool,
    is_relevant: bool,
    summary: String,
}

#[derive(Deserialize)]
struct RawElement {
    category: String,
    summary: String,
    #[serde(default)]
    text_segment: String,
    is_new_element: bool,
}

#[derive(Deserialize)]
struct RawRelation {
    source_index: usize,
    target_index: usize,
    relation_type: String,
    #[serde(default)]
    explanation: String,
}

#[derive(Deserialize, Default)]
struct RawAnalysis {
    #[serde(default)]
    elements: Vec<RawElement>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

pub struct ElementAnalyzer<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
    strategy: ResponseFormatStrategy,
}

impl<'a> ElementAnalyzer<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>, base_url: &str) -> Self {
        Self {
            llm,
            model: model.into(),
            strategy: ResponseFormatStrategy::detect(base_url),
        }
    }

    /// First-content-message idea check (§4.3). `is_relevant=false` maps to
    /// IRRELEVANT at the call site; the category mapping itself is the
    /// Tree Updater's job, not the analyzer's.
    #[instrument(skip(self, message), err)]
    pub async fn check_idea(&self, message: &str) -> Result<IdeaCheck, LlmError> {
        let prompt = format!(
            "The interviewee said: \"{message}\"\n\n\
             Decide whether this expresses a concrete idea about the stimulus, and whether \
             it is relevant at all. Respond as JSON: {{\"is_idea\": <bool>, \"is_relevant\": <bool>, \
             \"summary\": \"<4-6 word summary>\"}}"
        );
        let request = self.request(
            "You classify whether an interview response contains a relevant idea.",
            prompt,
            "{\"is_idea\": bool, \"is_relevant\": bool, \"summary\": string}",
        );
        let value = chat_json(self.llm, request).await?;
        let raw: RawIdeaCheck =
            serde_json::from_value(value).map_err(|e| LlmError::SchemaMismatch(e.to_string()))?;
        Ok(IdeaCheck {
            is_idea: raw.is_idea,
            is_relevant: raw.is_relevant,
            summary: raw.summary,
        })
    }

    /// Multi-element classification (§4.3). `active_label` biases the
    /// prompt's admission rules; validation of indices/label consistency
    /// happens here, not at the call site.
    #[instrument(skip(self, message, interview_path), fields(active_label = %active_label), err)]
    pub async fn analyze(
        &self,
        message: &str,
        stimulus: &str,
        topic: &str,
        interview_path: &str,
        active_label: NodeLabel,
    ) -> Result<AnalysisResult, LlmError> {
        let admission = match active_label {
            NodeLabel::Idea => "Only ATTRIBUTE elements are admissible.",
            NodeLabel::Attribute => "Only CONSEQUENCE elements are admissible.",
            NodeLabel::Consequence => {
                "VALUE elements are admissible only if causally bound to a CONSEQUENCE in the active chain."
            }
            _ => "Classify conservatively; prefer IRRELEVANT over a spurious guess.",
        };
        let prompt = format!(
            "Topic: {topic}\nStimulus: {stimulus}\nInterview path so far: {interview_path}\n\
             Active node label: {active_label}\n{admission}\n\n\
             The interviewee said: \"{message}\"\n\n\
             Extract every distinct element and the causal relations between them. Respond as \
             JSON: {{\"elements\": [{{\"category\": \"A|C|V|IRRELEVANT\", \"summary\": \"<=50 chars\", \
             \"text_segment\": \"...\", \"is_new_element\": <bool>}}], \"relations\": \
             [{{\"source_index\": <int>, \"target_index\": <int>, \"relation_type\": \"A->C|C->C|C->V\", \
             \"explanation\": \"...\"}}]}}"
        );
        let request = self.request(
            "You extract means-end-chain elements (attributes, consequences, values) and their causal links from an interview response.",
            prompt,
            "{\"elements\": [...], \"relations\": [...]}",
        );
        let value = chat_json(self.llm, request).await?;
        let raw: RawAnalysis =
            serde_json::from_value(value).map_err(|e| LlmError::SchemaMismatch(e.to_string()))?;

        let elements: Vec<AnalyzedElement> = raw
            .elements
            .into_iter()
            .filter_map(|e| {
                let category = match e.category.as_str() {
                    "A" => NodeLabel::Attribute,
                    "C" => NodeLabel::Consequence,
                    "V" => NodeLabel::Value,
                    "IRRELEVANT" => NodeLabel::Irrelevant,
                    _ => return None,
                };
                let summary = normalize_summary(&e.summary, category)?;
                Some(AnalyzedElement {
                    category,
                    summary,
                    text_segment: e.text_segment,
                    is_new_element: e.is_new_element,
                })
            })
            .collect();

        let relations = raw
            .relations
            .into_iter()
            .filter_map(|r| {
                let relation_type = RelationType::from_token(&r.relation_type)?;
                let (expected_source, expected_target) = relation_type.expected_labels();
                let source = elements.get(r.source_index)?;
                let target = elements.get(r.target_index)?;
                if source.category != expected_source || target.category != expected_target {
                    return None;
                }
                Some(CausalRelation {
                    source_index: r.source_index,
                    target_index: r.target_index,
                    relation_type,
                    explanation: r.explanation,
                })
            })
            .collect();

        Ok(AnalysisResult { elements, relations })
    }

    fn request(&self, system: &str, prompt: String, schema_hint: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(prompt)],
            model: self.model.clone(),
            temperature: 0.0,
            schema_hint: Some(schema_hint.to_string()),
            strategy: self.strategy,
        }
    }
}

/// Text-lexical normalization (§4.3): summaries below the length floor are
/// dropped outright; summaries above the ceiling are truncated.
fn normalize_summary(summary: &str, category: NodeLabel) -> Option<String> {
    let trimmed = summary.trim();
    let floor = if category == NodeLabel::Irrelevant { 3 } else { 10 };
    if trimmed.chars().count() < floor {
        return None;
    }
    if trimmed.chars().count() > 50 {
        let truncated: String = trimmed.chars().take(47).collect();
        return Some(format!("{truncated}..."));
    }
    Some(trimmed.to_string())
}
