//! Question Generator (C7): selects a template, builds prompt context,
//! invokes the LLM with a structured-output request, and parses the result.

pub mod templates;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::instrument;

use crate::errors::LlmError;
use crate::graph::{Graph, NodeLabel};
use crate::ids::NodeId;
use crate::llm::{chat_json, ChatMessage, ChatRequest, LlmProvider, ResponseFormatStrategy};
use crate::queue::TopicSwitch;
use crate::stage::Stage;

/// The structured output contract (§4.7, §6): `{Next: {...}}`.
#[derive(Clone, Debug)]
pub struct GeneratedQuestion {
    pub next_question: String,
    pub asking_interviewee_for: String,
    pub thought_process: String,
    pub end_of_interview: bool,
    pub completion_reason: Option<String>,
}

#[derive(Deserialize)]
struct RawNext {
    #[serde(rename = "NextQuestion")]
    next_question: String,
    #[serde(rename = "AskingIntervieweeFor")]
    asking_interviewee_for: String,
    #[serde(rename = "ThoughtProcess")]
    thought_process: String,
    #[serde(rename = "EndOfInterview")]
    end_of_interview: bool,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "Next")]
    next: RawNext,
}

/// The context the generator assembles before asking the LLM (§4.7).
pub struct PromptContext<'a> {
    pub topic: &'a str,
    pub stimulus: &'a str,
    pub stage: Stage,
    pub active_label: NodeLabel,
    pub active_content: &'a str,
    pub path_to_root: Vec<String>,
    pub parent_content: Option<&'a str>,
    pub latest_user_response: Option<&'a str>,
}

pub struct QuestionGenerator<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
    strategy: ResponseFormatStrategy,
}

const VALUES_LIMIT_ACK: &str =
    "Thank you, that gives me a clear picture of what matters to you here.";

impl<'a> QuestionGenerator<'a> {
    #[must_use]
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>, base_url: &str) -> Self {
        Self {
            llm,
            model: model.into(),
            strategy: ResponseFormatStrategy::detect(base_url),
        }
    }

    /// Values-limit short-circuit (§4.7): no LLM call when the gate is
    /// already tripped before generation.
    #[must_use]
    pub fn values_limit_acknowledgment() -> GeneratedQuestion {
        GeneratedQuestion {
            next_question: VALUES_LIMIT_ACK.to_string(),
            asking_interviewee_for: "nothing".to_string(),
            thought_process: "values limit reached".to_string(),
            end_of_interview: true,
            completion_reason: Some("VALUES_LIMIT_REACHED".to_string()),
        }
    }

    /// Generates the next question (§4.7). `topic_switch` decorates the
    /// result with a transition sentence when the queue advanced forcibly
    /// this turn. `values_limit_tripped_after` re-tests the gate after the
    /// LLM call returns (the race-check, §4.7).
    #[instrument(skip(self, ctx), fields(stage = %ctx.stage, active_label = %ctx.active_label), err)]
    pub async fn generate(
        &self,
        ctx: &PromptContext<'_>,
        unchanged_count: u32,
        topic_switch: Option<&TopicSwitch>,
        values_limit_tripped_after: bool,
    ) -> Result<GeneratedQuestion, LlmError> {
        let token = self.select_token(ctx, unchanged_count);
        let template = templates::template_for(&token)
            .ok_or_else(|| LlmError::SchemaMismatch(format!("no template registered for token {token}")))?;

        let mut vars = FxHashMap::default();
        vars.insert("stimulus", ctx.stimulus.to_string());
        vars.insert("active_content", ctx.active_content.to_string());
        vars.insert("parent_content", ctx.parent_content.unwrap_or(ctx.stimulus).to_string());
        let rendered = templates::render(template, &vars)
            .map_err(|missing| LlmError::SchemaMismatch(format!("template {token} missing var {missing}")))?;

        let system = self.build_system_prompt(ctx, &rendered);
        let request = ChatRequest {
            messages: self.build_messages(ctx, &system, &token),
            model: self.model.clone(),
            temperature: 0.7,
            schema_hint: Some(
                "{\"Next\": {\"NextQuestion\": string, \"AskingIntervieweeFor\": string, \"ThoughtProcess\": string, \"EndOfInterview\": bool}}"
                    .to_string(),
            ),
            strategy: self.strategy,
        };

        let value = chat_json(self.llm, request).await?;
        let raw: RawEnvelope =
            serde_json::from_value(value).map_err(|e| LlmError::SchemaMismatch(e.to_string()))?;

        let mut result = GeneratedQuestion {
            next_question: raw.next.next_question,
            asking_interviewee_for: raw.next.asking_interviewee_for,
            thought_process: raw.next.thought_process,
            end_of_interview: raw.next.end_of_interview || values_limit_tripped_after,
            completion_reason: values_limit_tripped_after.then(|| "VALUES_LIMIT_REACHED".to_string()),
        };

        if let Some(switch) = topic_switch {
            result.next_question = format!(
                "Let's move on from \"{}\" to \"{}\". {}",
                switch.previous_conclusion, switch.next_conclusion, result.next_question
            );
        }

        Ok(result)
    }

    /// Selects the question-type token (§4.7): the expanded variant when
    /// `unchanged_count >= 1` or the active node is IRRELEVANT, keyed on
    /// the effective parent label rather than the active label.
    fn select_token(&self, ctx: &PromptContext<'_>, unchanged_count: u32) -> String {
        if ctx.stage == Stage::AskingAgainForAttributes {
            return "ask_again_for_attributes".to_string();
        }
        let expanded = unchanged_count >= 1 || ctx.active_label == NodeLabel::Irrelevant;
        if expanded {
            return match ctx.active_label {
                NodeLabel::Idea => "expanded_idea_question",
                NodeLabel::Attribute => "expanded_attribute_question",
                NodeLabel::Consequence => "expanded_consequence_question",
                NodeLabel::Irrelevant => "irrelevant_redirect",
                _ => "expanded_idea_question",
            }
            .to_string();
        }
        match ctx.active_label {
            NodeLabel::Idea => "A1.1",
            NodeLabel::Attribute => "C1.1",
            NodeLabel::Consequence => "CV1.1",
            _ => "A1.1",
        }
        .to_string()
    }

    fn build_system_prompt(&self, ctx: &PromptContext<'_>, rendered_template: &str) -> String {
        format!(
            "You are conducting a laddering interview about \"{}\" (stimulus: {}). \
             Interview path so far: {}. Stage: {}. Ask one focused follow-up question. \
             Suggested framing: {rendered_template}",
            ctx.topic,
            ctx.stimulus,
            ctx.path_to_root.join(" > "),
            ctx.stage,
        )
    }

    /// For `ask_again_for_attributes`, no prior conversation is attached —
    /// only the system prompt (§4.7).
    fn build_messages(&self, ctx: &PromptContext<'_>, system: &str, token: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system)];
        if token != "ask_again_for_attributes" {
            if let Some(response) = ctx.latest_user_response {
                messages.push(ChatMessage::user(response));
            }
        }
        messages
    }
}

/// Builds the AUTO/IRRELEVANT-filtered path-to-root labels for
/// [`PromptContext::path_to_root`] (§4.7).
#[must_use]
pub fn render_path_to_root(graph: &Graph, active: NodeId) -> Vec<String> {
    graph
        .path_to_root(active)
        .into_iter()
        .filter_map(|id| graph.get(id))
        .filter(|n| n.label != NodeLabel::Irrelevant && !n.is_auto())
        .map(|n| n.conclusion.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;

    #[tokio::test]
    async fn values_limit_short_circuit_skips_llm() {
        let result = QuestionGenerator::values_limit_acknowledgment();
        assert!(result.end_of_interview);
        assert_eq!(result.completion_reason.as_deref(), Some("VALUES_LIMIT_REACHED"));
    }

    #[tokio::test]
    async fn generate_decorates_topic_switch() {
        let provider = ScriptedProvider::new([serde_json::json!({
            "Next": {
                "NextQuestion": "What happens then?",
                "AskingIntervieweeFor": "consequence",
                "ThoughtProcess": "probing",
                "EndOfInterview": false,
            }
        })
        .to_string()]);
        let generator = QuestionGenerator::new(&provider, "test-model", "http://localhost:1234");
        let ctx = PromptContext {
            topic: "music apps",
            stimulus: "offline playback",
            stage: Stage::AskingForAttributes,
            active_label: NodeLabel::Attribute,
            active_content: "automatic downloads",
            path_to_root: vec!["offline playback".to_string()],
            parent_content: None,
            latest_user_response: Some("automatic downloads"),
        };
        let switch = TopicSwitch {
            previous: crate::ids::NodeId::new(),
            previous_conclusion: "storage quality".to_string(),
            next: crate::ids::NodeId::new(),
            next_conclusion: "automatic downloads".to_string(),
        };
        let result = generator.generate(&ctx, 2, Some(&switch), false).await.unwrap();
        assert!(result.next_question.starts_with("Let's move on"));
    }
}
