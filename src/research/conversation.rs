//! Conversation simulation
//!
//! Each perspective runs a bounded asker/answerer dialog as an explicit state
//! machine. The transcript is moved from state to state by value; a round's
//! question and answer are appended together once the answer exists, so a
//! transcript never holds half a round.
//!
//! ```text
//! AskerTurn --Continue(q)--> AnswererTurn --answer--> AskerTurn
//!     |                                                   |
//!     +--Stop / budget spent / cancelled / asker failed---+--> Done
//! ```
//!
//! The answerer always finishes its round, even after run cancellation; the
//! next asker turn observes the token and ends the conversation.

use crate::research::citations;
use crate::research::{parse_list, roles, ResearchContext};
use crate::search::SearchHit;
use crate::store::Candidate;
use crate::types::{ConversationTurn, Degradation, Perspective, ReferenceId, Result, TurnRole};
use crate::utils::http::truncate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;

/// The phrase the asker is told to use when it has nothing left to ask.
pub const STOP_PHRASE: &str = "Thank you so much for your help!";

const STOP_MARKER: &str = "thank you so much for your help";

/// Answer recorded when no usable source was found for a question.
pub const NO_SOURCES_ANSWER: &str =
    "I could not find reliable information for this question. Please ask another question.";

/// Answer recorded when synthesis failed after retries.
pub const NO_ANSWER: &str = "No answer could be produced for this question.";

/// Sources shown to the answerer per round
const MAX_SOURCES_PER_ROUND: usize = 10;
const SOURCE_SNIPPET_CHARS: usize = 1000;
/// Earlier answers are shortened in the asker's view of the dialog
const HISTORY_ANSWER_CHARS: usize = 300;
/// Rounds shown in full to the asker
const FULL_HISTORY_ROUNDS: usize = 4;

/// The asker's decision for the next round, parsed from untrusted model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskerSignal {
    Continue(String),
    Stop,
}

impl AskerSignal {
    pub fn parse(reply: &str) -> Self {
        let trimmed = reply.trim();
        let lowered = trimmed.to_lowercase();
        if trimmed.is_empty() || lowered == "stop" || lowered.contains(STOP_MARKER) {
            return AskerSignal::Stop;
        }

        let question = trimmed
            .trim_start_matches("Question:")
            .trim_start_matches("Q:")
            .trim();
        AskerSignal::Continue(question.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// All M rounds ran
    BudgetExhausted,
    /// The asker sent the stop signal
    AskerStopped,
    /// The run token fired between rounds
    Cancelled,
    /// The asker could not produce a question after some rounds had completed
    AskerFailed,
}

/// Append-only record of one perspective's dialog.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub perspective: Perspective,
    pub turns: Vec<ConversationTurn>,
    pub finish: FinishReason,
    pub degradations: Vec<Degradation>,
}

impl Transcript {
    fn new(perspective: Perspective) -> Self {
        Self {
            perspective,
            turns: Vec::new(),
            finish: FinishReason::BudgetExhausted,
            degradations: Vec::new(),
        }
    }

    /// Completed rounds
    pub fn rounds(&self) -> usize {
        self.turns.len() / 2
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Answer turn of round `index`, if that round completed
    pub fn answer(&self, index: usize) -> Option<&ConversationTurn> {
        self.turns
            .iter()
            .find(|t| t.round_index == index && t.role == TurnRole::Answerer)
    }

    /// Every reference id cited by an answer
    pub fn cited_reference_ids(&self) -> Vec<ReferenceId> {
        let mut seen = HashSet::new();
        self.turns
            .iter()
            .flat_map(|t| t.cited_reference_ids.iter())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Dialog as plain text with citation markers removed.
    pub fn render(&self, max_answer_chars: usize) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            match turn.role {
                TurnRole::Asker => out.push_str(&format!("Q: {}\n", turn.text.trim())),
                TurnRole::Answerer => {
                    let plain = citations::strip_markers(&turn.text);
                    out.push_str(&format!("A: {}\n\n", truncate(plain.trim(), max_answer_chars)));
                }
            }
        }
        out
    }

    fn push_round(mut self, question: String, answer: Answer) -> Self {
        let round_index = self.rounds();
        let perspective_id = self.perspective.id;

        if let Some(reason) = &answer.degraded {
            tracing::warn!(perspective = perspective_id, round = round_index, reason = %reason, "Round degraded");
            self.degradations.push(Degradation::RoundDegraded {
                perspective: perspective_id,
                round: round_index,
                reason: reason.clone(),
            });
        }

        self.turns.push(ConversationTurn {
            perspective_id,
            round_index,
            role: TurnRole::Asker,
            text: question,
            cited_reference_ids: Vec::new(),
            degraded: false,
        });
        self.turns.push(ConversationTurn {
            perspective_id,
            round_index,
            role: TurnRole::Answerer,
            text: answer.text,
            cited_reference_ids: answer.cited,
            degraded: answer.degraded.is_some(),
        });
        self
    }

    fn finish(mut self, reason: FinishReason) -> Self {
        self.finish = reason;
        self
    }
}

/// Result of one answerer turn
#[derive(Debug, Clone)]
struct Answer {
    text: String,
    cited: Vec<ReferenceId>,
    /// Why the answer fell back, if it did
    degraded: Option<String>,
}

enum ConversationState {
    AskerTurn(Transcript),
    AnswererTurn(Transcript, String),
    Done(Transcript),
}

/// Runs the asker/answerer dialog for one perspective at a time.
#[derive(Clone)]
pub struct ConversationEngine {
    ctx: ResearchContext,
    topic: String,
}

impl ConversationEngine {
    pub fn new(ctx: ResearchContext, topic: impl Into<String>) -> Self {
        Self {
            ctx,
            topic: topic.into(),
        }
    }

    /// Run the dialog for `perspective` until the round budget, an explicit
    /// stop, or cancellation.
    ///
    /// # Errors
    ///
    /// Fails when no round could be completed because the first question
    /// could not be produced, or on `Authentication`. The caller drops the
    /// perspective in the first case.
    pub async fn run(&self, perspective: Perspective) -> Result<Transcript> {
        let max_rounds = self.ctx.settings.max_rounds;
        let mut state = ConversationState::AskerTurn(Transcript::new(perspective));

        loop {
            state = match state {
                ConversationState::AskerTurn(transcript) => {
                    if transcript.rounds() >= max_rounds {
                        ConversationState::Done(transcript.finish(FinishReason::BudgetExhausted))
                    } else if self.ctx.cancel.is_cancelled() {
                        ConversationState::Done(transcript.finish(FinishReason::Cancelled))
                    } else {
                        self.asker_turn(transcript).await?
                    }
                }
                ConversationState::AnswererTurn(transcript, question) => {
                    let answer = self.answer(&transcript, &question).await?;
                    ConversationState::AskerTurn(transcript.push_round(question, answer))
                }
                ConversationState::Done(transcript) => {
                    tracing::info!(
                        perspective = transcript.perspective.id,
                        rounds = transcript.rounds(),
                        finish = ?transcript.finish,
                        "Conversation finished"
                    );
                    return Ok(transcript);
                }
            };
        }
    }

    async fn asker_turn(&self, transcript: Transcript) -> Result<ConversationState> {
        let round = transcript.rounds();
        let perspective = transcript.perspective.id;
        let prompt = self.asker_prompt(&transcript);

        let reply = self.ctx.complete("asker", &prompt, roles::ASKER).await;
        let state = match reply.map(|r| AskerSignal::parse(&r)) {
            Ok(AskerSignal::Continue(question)) => {
                tracing::debug!(perspective, round, question = %question, "Asker question");
                ConversationState::AnswererTurn(transcript, question)
            }
            Ok(AskerSignal::Stop) => {
                tracing::debug!(perspective, round, "Asker has no further questions");
                ConversationState::Done(transcript.finish(FinishReason::AskerStopped))
            }
            Err(e) if e.is_cancelled() => {
                ConversationState::Done(transcript.finish(FinishReason::Cancelled))
            }
            Err(e) if e.is_fatal() || round == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(perspective, round, error = %e, "Asker failed; ending conversation early");
                let mut transcript = transcript.finish(FinishReason::AskerFailed);
                transcript.degradations.push(Degradation::RoundDegraded {
                    perspective,
                    round,
                    reason: format!("no question: {}", e),
                });
                ConversationState::Done(transcript)
            }
        };
        Ok(state)
    }

    fn asker_prompt(&self, transcript: &Transcript) -> String {
        let perspective = &transcript.perspective;
        let history = if transcript.turns.is_empty() {
            "(the conversation has not started)".to_string()
        } else {
            let skip = transcript.rounds().saturating_sub(FULL_HISTORY_ROUNDS) * 2;
            let mut recent = transcript.clone();
            recent.turns.drain(..skip);
            recent.render(HISTORY_ANSWER_CHARS)
        };

        format!(
            r#"You are researching the topic "{topic}" for an encyclopedia article.
Your perspective: {label}. {description}

Conversation so far:
{history}
Ask the expert one new question that helps you write the article from your perspective.
Do not repeat earlier questions. Ask only one question at a time.
When you have no more questions, say "{stop}" and nothing else."#,
            topic = self.topic,
            label = perspective.label,
            description = perspective.description,
            history = history,
            stop = STOP_PHRASE,
        )
    }

    /// Answer one question. Only `Authentication` escapes; every other
    /// failure degrades the answer. Calls in flight finish after run
    /// cancellation so the round completes, but nothing is retried.
    async fn answer(&self, transcript: &Transcript, question: &str) -> Result<Answer> {
        let perspective = transcript.perspective.id;
        let round = transcript.rounds();
        let queries = self.queries(question).await?;
        let hits = self.gather(&queries).await?;

        let (usable, rejected) = self.ctx.policy.filter(hits);
        if rejected > 0 {
            tracing::debug!(perspective, round, rejected, "Excluded unreliable sources");
        }

        let mut sources: Vec<(ReferenceId, SearchHit)> = Vec::new();
        for hit in usable {
            if sources.len() >= MAX_SOURCES_PER_ROUND {
                break;
            }
            match self.ctx.store.insert(Candidate::from(hit.clone())) {
                Ok(id) => {
                    if !sources.iter().any(|(existing, _)| *existing == id) {
                        sources.push((id, hit));
                    }
                }
                Err(e) => tracing::debug!(url = %hit.url, error = %e, "Skipping unusable search hit"),
            }
        }

        if sources.is_empty() {
            return Ok(Answer {
                text: NO_SOURCES_ANSWER.to_string(),
                cited: Vec::new(),
                degraded: Some("search returned no usable results".to_string()),
            });
        }

        let prompt = answer_prompt(&self.topic, question, &sources);
        match self
            .ctx
            .complete_settled("answerer", &prompt, roles::ANSWERER)
            .await
        {
            Ok(reply) => {
                let candidates: Vec<ReferenceId> = sources.into_iter().map(|(id, _)| id).collect();
                let resolved = citations::resolve(&reply, &candidates);
                if !resolved.stripped.is_empty() {
                    tracing::debug!(perspective, round, stripped = ?resolved.stripped, "Removed unknown citations from answer");
                }
                Ok(Answer {
                    text: resolved.text.trim().to_string(),
                    cited: resolved.cited,
                    degraded: None,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Answer {
                text: NO_ANSWER.to_string(),
                cited: Vec::new(),
                degraded: Some(format!("answer synthesis failed: {}", e)),
            }),
        }
    }

    /// Search queries for a question; falls back to the question itself.
    async fn queries(&self, question: &str) -> Result<Vec<String>> {
        let limit = self.ctx.settings.queries_per_question.max(1);
        let prompt = format!(
            r#"Topic: {topic}
Question: {question}

Write up to {limit} short web search queries that would find the answer.
Return only the queries, one per line."#,
            topic = self.topic,
        );

        let queries = match self
            .ctx
            .complete_settled("queries", &prompt, roles::QUERY_WRITER)
            .await
        {
            Ok(reply) => parse_list(&reply).into_iter().take(limit).collect(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Query generation failed; searching the question directly");
                Vec::new()
            }
        };

        if queries.is_empty() {
            Ok(vec![question.to_string()])
        } else {
            Ok(queries)
        }
    }

    /// Run every query, merging hits in query order and dropping repeated URLs.
    /// Failed queries contribute nothing.
    async fn gather(&self, queries: &[String]) -> Result<Vec<SearchHit>> {
        let results = join_all(
            queries
                .iter()
                .map(|q| self.ctx.web_search_settled("search", q)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(found) => hits.extend(found.into_iter().filter(|h| seen.insert(h.url.clone()))),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(query = %query, error = %e, "Search failed; continuing without it"),
            }
        }
        Ok(hits)
    }
}

fn answer_prompt(topic: &str, question: &str, sources: &[(ReferenceId, SearchHit)]) -> String {
    let numbered: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, (_, hit))| {
            format!(
                "[{}] {}\n{}\n{}",
                i + 1,
                hit.title.trim(),
                hit.url,
                truncate(hit.snippet.trim(), SOURCE_SNIPPET_CHARS)
            )
        })
        .collect();

    format!(
        r#"Topic: {topic}
Question: {question}

Sources:
{sources}

Answer the question using only these sources. Cite every claim inline with the
source number in square brackets, e.g. [1] or [2, 3]. If the sources do not
answer the question, say so."#,
        sources = numbered.join("\n\n"),
    )
}
