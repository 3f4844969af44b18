use crate::llm::{Provider, RetryPolicy};
use crate::research::conversation::{ConversationEngine, FinishReason, Transcript};
use crate::research::outline::OutlineSynthesizer;
use crate::research::perspectives::PerspectiveDiscovery;
use crate::research::polish::Polisher;
use crate::research::writer::SectionWriter;
use crate::research::ResearchContext;
use crate::search::{create_search_client, SourcePolicy};
use crate::store::ReferenceStore;
use crate::types::{AppError, Article, Degradation, Perspective, Result, Section};
use crate::utils::toml_config::{Secrets, StormerConfig};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Drives one research run from topic to article.
///
/// Each run should get a fresh coordinator: the reference store and the
/// cancellation token belong to a single run.
pub struct ResearchCoordinator {
    ctx: ResearchContext,
}

impl ResearchCoordinator {
    pub fn new(ctx: ResearchContext) -> Self {
        Self { ctx }
    }

    /// Build a coordinator with the configured gateways and a fresh store.
    ///
    /// # Errors
    ///
    /// `Configuration` when a required API key is missing.
    pub fn from_config(config: &StormerConfig, secrets: &Secrets) -> Result<Self> {
        let provider = Provider::from_config(&config.openrouter, secrets)?;
        let llm = provider.create_client()?;
        let search = create_search_client(config, secrets)?;
        tracing::info!(
            provider = provider.name(),
            model = llm.model_name(),
            search = search.name(),
            "Gateways configured"
        );

        let ctx = ResearchContext::new(llm, search, Arc::new(build_store()), config.research.clone())
            .with_policy(SourcePolicy::from_config(&config.search))
            .with_retry(RetryPolicy::from(&config.retry))
            .with_max_results(config.search.max_results);
        Ok(Self::new(ctx))
    }

    /// Token that cancels the run. Cancelling it makes [`run`](Self::run)
    /// return a degraded article built from whatever was finished.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.ctx.store
    }

    /// Execute the full pipeline for `topic`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a blank topic
    /// - `Authentication` from any external call
    /// - `Discovery` when no perspective could be found
    /// - `NoUsableOutput` when no perspective, outline or section survived
    /// - `Cancelled` when the run was cancelled before any perspective existed
    pub async fn run(&self, topic: &str) -> Result<Article> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::InvalidInput("Topic must not be empty".to_string()));
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("research_run", %run_id, topic);

        let timer = self.start_timer();
        let result = self.pipeline(topic).instrument(span).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        match &result {
            Ok(article) if article.is_degraded() => tracing::warn!(
                topic,
                sections = article.sections.len(),
                references = article.references.len(),
                degradations = article.degradations.len(),
                "Research run finished with degradations"
            ),
            Ok(article) => tracing::info!(
                topic,
                sections = article.sections.len(),
                references = article.references.len(),
                "Research run finished"
            ),
            Err(e) => tracing::error!(topic, error = %e, "Research run failed"),
        }
        result
    }

    fn start_timer(&self) -> Option<tokio::task::JoinHandle<()>> {
        let secs = self.ctx.settings.run_timeout_secs;
        if secs == 0 {
            return None;
        }
        let token = self.ctx.cancel.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    tracing::warn!(timeout_secs = secs, "Run timeout reached; cancelling");
                    token.cancel();
                }
            }
        }))
    }

    async fn pipeline(&self, topic: &str) -> Result<Article> {
        let mut degradations = Vec::new();

        tracing::info!(topic, "Discovering perspectives");
        let discovery = PerspectiveDiscovery::new(&self.ctx).discover(topic).await?;
        degradations.extend(discovery.degradations);

        tracing::info!(perspectives = discovery.perspectives.len(), "Running conversations");
        let transcripts = self
            .converse(topic, discovery.perspectives, &mut degradations)
            .await?;
        if self.ctx.cancel.is_cancelled() {
            return Ok(self.partial_article(topic, Vec::new(), degradations, "conversations"));
        }

        tracing::info!(transcripts = transcripts.len(), "Synthesizing outline");
        let outline = match OutlineSynthesizer::new(&self.ctx)
            .synthesize(topic, &transcripts)
            .await
        {
            Ok(outline) => outline,
            Err(e) if e.is_cancelled() => {
                return Ok(self.partial_article(topic, Vec::new(), degradations, "outline"))
            }
            Err(e) => return Err(e),
        };
        degradations.extend(outline.degradations);

        tracing::info!(sections = outline.tree.len() - 1, "Writing sections");
        let written = SectionWriter::new(self.ctx.clone(), topic)
            .write_all(&outline.tree)
            .await?;
        degradations.extend(written.degradations);
        if written.cancelled {
            return Ok(self.partial_article(topic, written.sections, degradations, "section writing"));
        }
        if written.sections.is_empty() {
            return Err(AppError::NoUsableOutput(format!(
                "no section could be written for '{}'",
                topic
            )));
        }

        tracing::info!("Polishing article");
        let polished = Polisher::new(&self.ctx).polish(topic, written.sections).await?;
        degradations.extend(polished.degradations);

        Ok(Article {
            topic: topic.to_string(),
            lead_summary: polished.lead_summary,
            sections: polished.sections,
            references: self.ctx.store.all(),
            degradations,
        })
    }

    /// Run every perspective's conversation concurrently; results are ordered by perspective id.
    async fn converse(
        &self,
        topic: &str,
        perspectives: Vec<Perspective>,
        degradations: &mut Vec<Degradation>,
    ) -> Result<Vec<Transcript>> {
        let engine = ConversationEngine::new(self.ctx.clone(), topic);
        let limit = Arc::new(Semaphore::new(
            self.ctx.settings.max_concurrent_conversations.max(1),
        ));
        let mut set = JoinSet::new();

        for perspective in perspectives {
            let engine = engine.clone();
            let limit = limit.clone();
            set.spawn(async move {
                let id = perspective.id;
                let _permit = limit.acquire_owned().await;
                let outcome = AssertUnwindSafe(engine.run(perspective))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(AppError::Internal("conversation task panicked".to_string()))
                    });
                (id, outcome)
            });
        }

        let mut transcripts = Vec::new();
        let mut dropped = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(transcript))) => transcripts.push(transcript),
                Ok((_, Err(e))) if e.is_fatal() => {
                    set.abort_all();
                    return Err(e);
                }
                Ok((id, Err(e))) => {
                    tracing::warn!(perspective = id, error = %e, "Perspective dropped");
                    dropped.push(Degradation::PerspectiveDropped {
                        perspective: id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => tracing::error!(error = %e, "Conversation task did not complete"),
            }
        }

        transcripts.sort_by_key(|t| t.perspective.id);
        dropped.sort_by_key(|d| match d {
            Degradation::PerspectiveDropped { perspective, .. } => *perspective,
            _ => usize::MAX,
        });

        // Conversations cancelled before their first question produced nothing.
        transcripts.retain(|t| !(t.finish == FinishReason::Cancelled && t.rounds() == 0));
        for transcript in &transcripts {
            degradations.extend(transcript.degradations.iter().cloned());
        }
        degradations.extend(dropped);

        if transcripts.is_empty() && !self.ctx.cancel.is_cancelled() {
            return Err(AppError::NoUsableOutput(
                "every perspective conversation failed".to_string(),
            ));
        }
        Ok(transcripts)
    }

    fn partial_article(
        &self,
        topic: &str,
        sections: Vec<Section>,
        mut degradations: Vec<Degradation>,
        stage: &str,
    ) -> Article {
        tracing::warn!(stage, sections = sections.len(), "Run cancelled; emitting partial article");
        degradations.push(Degradation::Cancelled {
            stage: stage.to_string(),
        });
        Article {
            topic: topic.to_string(),
            lead_summary: String::new(),
            sections,
            references: self.ctx.store.all(),
            degradations,
        }
    }
}

#[cfg(feature = "local-embeddings")]
fn build_store() -> ReferenceStore {
    match crate::store::embeddings::FastEmbedder::new() {
        Ok(embedder) => ReferenceStore::with_embedder(Arc::new(embedder)),
        Err(e) => {
            tracing::warn!(error = %e, "Embedding model unavailable; ranking references lexically");
            ReferenceStore::new()
        }
    }
}

#[cfg(not(feature = "local-embeddings"))]
fn build_store() -> ReferenceStore {
    ReferenceStore::new()
}
