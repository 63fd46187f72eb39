//! Retrieval-augmented answering.
//!
//! `QaPipeline::answer` drives one question through retrieval, grounded
//! generation, and the fallback path:
//!
//! - no usable index -> fallback, tagged as ungrounded
//! - retrieval empty OR grounded answer blank -> fallback, tagged
//! - stop flag observed at a pre-call checkpoint -> fixed sentinel
//! - provider error -> fixed apology, never propagated
//!
//! The stop flag is polled a fixed number of times with fixed pacing
//! before any model call; once a call is in flight it is not preempted.

use std::sync::Arc;
use std::time::Duration;

use super::index::ScoredChunk;
use super::manager::IndexManager;
use crate::cancel::StopFlag;
use crate::core::config::{CancellationSettings, GenerationSettings, RetrievalSettings, Settings};
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};
use crate::sessions::{Role, Turn};

pub const CANCELLED_ANSWER: &str = "Answer generation was stopped.";
pub const APOLOGY_ANSWER: &str = "Sorry, I was unable to generate an answer.";
pub const UNGROUNDED_PREFIX: &str =
    "No relevant passages were found in the uploaded documents; answering from the model's general knowledge:\n";
pub const NO_INDEX_PREFIX: &str =
    "No documents have been indexed yet; answering from the model's general knowledge:\n";

const GROUNDED_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about the user's documents. \
     Use the provided passages as your primary source; if they do not contain the answer, say so.";
const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the following question based solely on \
     your training data. Please don't make up any contents.";

/// How an answering chain runs: with a retriever in front of the model,
/// or the bare model. Selected structurally, never probed.
pub enum Answerer<'a> {
    Grounded {
        session_id: &'a str,
        top_k: usize,
        score_threshold: Option<f32>,
    },
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Completed,
    Cancelled,
    Failed,
}

/// What a single chain run produced. Never an error: failures collapse to
/// the apology string with `Failed` status.
pub struct ChainAnswer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    pub status: ChainStatus,
}

impl ChainAnswer {
    fn cancelled() -> Self {
        Self {
            answer: CANCELLED_ANSWER.to_string(),
            sources: Vec::new(),
            status: ChainStatus::Cancelled,
        }
    }

    fn failed() -> Self {
        Self {
            answer: APOLOGY_ANSWER.to_string(),
            sources: Vec::new(),
            status: ChainStatus::Failed,
        }
    }
}

/// Terminal outcome of one question, ready for the caller.
#[derive(Debug)]
pub struct AnswerOutcome {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
    pub grounded: bool,
    pub cancelled: bool,
}

pub struct QaPipeline {
    provider: Arc<dyn LlmProvider>,
    indexes: Arc<IndexManager>,
    retrieval: RetrievalSettings,
    generation: GenerationSettings,
    cancellation: CancellationSettings,
}

impl QaPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        indexes: Arc<IndexManager>,
        settings: &Settings,
    ) -> Self {
        Self {
            provider,
            indexes,
            retrieval: settings.retrieval.clone(),
            generation: settings.generation.clone(),
            cancellation: settings.cancellation.clone(),
        }
    }

    /// Answer `question` for `session_id` given the prior conversation.
    pub async fn answer(
        &self,
        session_id: &str,
        question: &str,
        history: &[Turn],
        stop: &StopFlag,
    ) -> AnswerOutcome {
        if !self.indexes.is_ready(session_id).await {
            let fallback = self
                .conversational_answer(Answerer::Fallback, question, history, stop)
                .await;
            return Self::fallback_outcome(fallback, NO_INDEX_PREFIX);
        }

        let grounded = Answerer::Grounded {
            session_id,
            top_k: self.retrieval.top_k,
            score_threshold: self.retrieval.score_threshold,
        };
        let response = self
            .conversational_answer(grounded, question, history, stop)
            .await;

        match response.status {
            ChainStatus::Cancelled => Self::cancelled_outcome(),
            ChainStatus::Failed => AnswerOutcome {
                answer: response.answer,
                sources: Vec::new(),
                grounded: false,
                cancelled: false,
            },
            ChainStatus::Completed => {
                // Fallback triggers on either emptiness: nothing retrieved,
                // or a grounded answer that came back blank.
                if response.sources.is_empty() || response.answer.trim().is_empty() {
                    let fallback = self
                        .conversational_answer(Answerer::Fallback, question, history, stop)
                        .await;
                    Self::fallback_outcome(fallback, UNGROUNDED_PREFIX)
                } else {
                    AnswerOutcome {
                        answer: response.answer,
                        sources: response.sources,
                        grounded: true,
                        cancelled: false,
                    }
                }
            }
        }
    }

    /// Run one answering chain. Polls the stop flag at fixed checkpoints
    /// before issuing any model call; retrieval itself cannot fail (an
    /// empty result is a valid outcome), and provider errors collapse to
    /// the apology answer.
    pub async fn conversational_answer(
        &self,
        answerer: Answerer<'_>,
        question: &str,
        history: &[Turn],
        stop: &StopFlag,
    ) -> ChainAnswer {
        for _ in 0..self.cancellation.checkpoints {
            if stop.is_stopped() {
                return ChainAnswer::cancelled();
            }
            tokio::time::sleep(Duration::from_millis(self.cancellation.poll_interval_ms)).await;
        }
        if stop.is_stopped() {
            return ChainAnswer::cancelled();
        }

        match answerer {
            Answerer::Grounded {
                session_id,
                top_k,
                score_threshold,
            } => {
                let query_embedding = match self.embed_query(question).await {
                    Ok(embedding) => embedding,
                    Err(err) => {
                        tracing::warn!("Query embedding failed: {}", err);
                        return ChainAnswer::failed();
                    }
                };

                let sources = self
                    .indexes
                    .search(session_id, &query_embedding, top_k, score_threshold)
                    .await;
                if sources.is_empty() {
                    return ChainAnswer {
                        answer: String::new(),
                        sources,
                        status: ChainStatus::Completed,
                    };
                }

                let mut messages = vec![
                    ChatMessage::system(GROUNDED_SYSTEM_PROMPT),
                    ChatMessage::system(format!("Passages:\n{}", format_context(&sources))),
                ];
                messages.extend(history_messages(history));
                messages.push(ChatMessage::user(question));

                match self.chat(messages).await {
                    Ok(answer) => ChainAnswer {
                        answer,
                        sources,
                        status: ChainStatus::Completed,
                    },
                    Err(err) => {
                        tracing::warn!("Grounded answer failed: {}", err);
                        ChainAnswer::failed()
                    }
                }
            }
            Answerer::Fallback => {
                let mut messages = vec![ChatMessage::system(FALLBACK_SYSTEM_PROMPT)];
                messages.extend(history_messages(history));
                messages.push(ChatMessage::user(question));

                match self.chat(messages).await {
                    Ok(answer) => ChainAnswer {
                        answer,
                        sources: Vec::new(),
                        status: ChainStatus::Completed,
                    },
                    Err(err) => {
                        tracing::warn!("Fallback answer failed: {}", err);
                        ChainAnswer::failed()
                    }
                }
            }
        }
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.provider.embed(&[question.to_string()]).await?;
        if vectors.is_empty() || vectors[0].is_empty() {
            return Err(ApiError::EmbeddingFailure);
        }
        Ok(vectors.remove(0))
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        self.provider
            .chat(ChatRequest::new(messages).with_generation(&self.generation))
            .await
    }

    fn cancelled_outcome() -> AnswerOutcome {
        AnswerOutcome {
            answer: CANCELLED_ANSWER.to_string(),
            sources: Vec::new(),
            grounded: false,
            cancelled: true,
        }
    }

    fn fallback_outcome(fallback: ChainAnswer, prefix: &str) -> AnswerOutcome {
        match fallback.status {
            ChainStatus::Cancelled => Self::cancelled_outcome(),
            ChainStatus::Failed => AnswerOutcome {
                answer: fallback.answer,
                sources: Vec::new(),
                grounded: false,
                cancelled: false,
            },
            ChainStatus::Completed => AnswerOutcome {
                answer: format!("{}{}", prefix, fallback.answer),
                sources: Vec::new(),
                grounded: false,
                cancelled: false,
            },
        }
    }
}

/// Format retrieved passages into a numbered context block with source
/// citations.
fn format_context(sources: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for (i, sc) in sources.iter().enumerate() {
        context.push_str(&format!(
            "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
            i + 1,
            sc.chunk.source,
            sc.score,
            sc.chunk.content
        ));
    }
    context.trim_end().to_string()
}

fn history_messages(history: &[Turn]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::collections::VecDeque;
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::config::IndexScope;
    use crate::rag::chunker::chunk_text;

    fn hash_embedding(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; 32];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % 32) as usize] += 1.0;
        }
        vector
    }

    /// Deterministic provider: hash embeddings plus a scripted queue of
    /// chat replies ("!err" entries turn into provider errors).
    #[derive(Default)]
    struct MockProvider {
        chat_replies: Mutex<VecDeque<String>>,
        last_messages: Mutex<Vec<ChatMessage>>,
        chat_calls: AtomicUsize,
        embed_calls: AtomicUsize,
    }

    impl MockProvider {
        fn scripted(replies: &[&str]) -> Self {
            Self {
                chat_replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                ..Self::default()
            }
        }

        fn chat_calls(&self) -> usize {
            self.chat_calls.load(Ordering::SeqCst)
        }

        fn embed_calls(&self) -> usize {
            self.embed_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = request.messages;
            let reply = self
                .chat_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "default answer".to_string());
            if reply == "!err" {
                return Err(ApiError::ModelCallFailure("scripted failure".into()));
            }
            Ok(reply)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|text| hash_embedding(text)).collect())
        }
    }

    fn fast_settings() -> Settings {
        let mut settings = Settings::default();
        settings.cancellation.checkpoints = 2;
        settings.cancellation.poll_interval_ms = 1;
        settings.retrieval.score_threshold = Some(0.5);
        settings
    }

    struct Fixture {
        provider: Arc<MockProvider>,
        pipeline: QaPipeline,
        indexes: Arc<IndexManager>,
        _dir: tempfile::TempDir,
    }

    fn fixture(provider: MockProvider) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(provider);
        let indexes = Arc::new(IndexManager::new(
            dir.path().join("vector_stores"),
            IndexScope::Global,
        ));
        let pipeline = QaPipeline::new(provider.clone(), indexes.clone(), &fast_settings());
        Fixture {
            provider,
            pipeline,
            indexes,
            _dir: dir,
        }
    }

    async fn index_document(fixture: &Fixture, text: &str) {
        let chunks = chunk_text(text, "doc.txt", 64, 8).unwrap();
        fixture
            .indexes
            .ingest("s1", chunks, fixture.provider.as_ref())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pre_set_stop_flag_short_circuits_without_model_calls() {
        let fx = fixture(MockProvider::default());
        index_document(&fx, "some indexed content to make the index ready").await;

        let stop = StopFlag::new();
        stop.stop();

        let calls_before = fx.provider.embed_calls();
        let outcome = fx.pipeline.answer("s1", "anything", &[], &stop).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.answer, CANCELLED_ANSWER);
        assert!(outcome.sources.is_empty());
        assert_eq!(fx.provider.chat_calls(), 0);
        assert_eq!(fx.provider.embed_calls(), calls_before);
    }

    #[tokio::test]
    async fn grounded_answer_carries_sources() {
        let fx = fixture(MockProvider::scripted(&["it is blue"]));
        index_document(&fx, "the sky is blue and vast today over the hills").await;

        let outcome = fx
            .pipeline
            .answer("s1", "the sky is blue and vast today over the hills", &[], &StopFlag::new())
            .await;

        assert!(outcome.grounded);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.answer, "it is blue");
        assert!(!outcome.sources.is_empty());
        assert_eq!(outcome.sources[0].chunk.source, "doc.txt");
    }

    #[tokio::test]
    async fn no_index_goes_straight_to_tagged_fallback() {
        let fx = fixture(MockProvider::scripted(&["general knowledge answer"]));

        let outcome = fx
            .pipeline
            .answer("s1", "what is rust", &[], &StopFlag::new())
            .await;

        assert!(!outcome.grounded);
        assert!(outcome.answer.starts_with(NO_INDEX_PREFIX));
        assert!(outcome.answer.ends_with("general knowledge answer"));
        // Fallback never embeds; one chat call only.
        assert_eq!(fx.provider.embed_calls(), 0);
        assert_eq!(fx.provider.chat_calls(), 1);
    }

    #[tokio::test]
    async fn empty_retrieval_triggers_tagged_fallback() {
        let fx = fixture(MockProvider::scripted(&["fallback answer"]));
        index_document(&fx, "completely unrelated corpus about gardening tips").await;

        let outcome = fx
            .pipeline
            .answer("s1", "quantum chromodynamics lagrangian", &[], &StopFlag::new())
            .await;

        assert!(!outcome.grounded);
        assert!(outcome.sources.is_empty());
        assert!(outcome.answer.starts_with(UNGROUNDED_PREFIX));
        assert!(outcome.answer.ends_with("fallback answer"));
    }

    #[tokio::test]
    async fn blank_grounded_answer_triggers_fallback() {
        let fx = fixture(MockProvider::scripted(&["   ", "second try"]));
        index_document(&fx, "the sky is blue and vast today over the hills").await;

        let outcome = fx
            .pipeline
            .answer("s1", "the sky is blue and vast today over the hills", &[], &StopFlag::new())
            .await;

        assert!(!outcome.grounded);
        assert!(outcome.answer.starts_with(UNGROUNDED_PREFIX));
        assert!(outcome.answer.ends_with("second try"));
        assert_eq!(fx.provider.chat_calls(), 2);
    }

    #[tokio::test]
    async fn model_failure_returns_apology_not_error() {
        let fx = fixture(MockProvider::scripted(&["!err"]));
        index_document(&fx, "the sky is blue and vast today over the hills").await;

        let outcome = fx
            .pipeline
            .answer("s1", "the sky is blue and vast today over the hills", &[], &StopFlag::new())
            .await;

        assert!(!outcome.grounded);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.answer, APOLOGY_ANSWER);
        // A failed grounded call is terminal; no fallback retry.
        assert_eq!(fx.provider.chat_calls(), 1);
    }

    #[tokio::test]
    async fn history_is_forwarded_in_order() {
        let fx = fixture(MockProvider::scripted(&["ok"]));

        let history = vec![
            Turn::user("first question"),
            Turn::assistant("first answer"),
        ];
        let answer = fx
            .pipeline
            .conversational_answer(Answerer::Fallback, "followup", &history, &StopFlag::new())
            .await;

        assert_eq!(answer.status, ChainStatus::Completed);
        assert_eq!(answer.answer, "ok");

        let messages = fx.provider.last_messages.lock().unwrap().clone();
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "first question");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[2].content, "first answer");
        assert_eq!(messages[3].content, "followup");
    }

    #[test]
    fn context_block_numbers_sources() {
        let chunks = chunk_text("alpha beta gamma", "a.txt", 64, 8).unwrap();
        let sources = vec![ScoredChunk {
            chunk: chunks[0].clone(),
            score: 0.93,
        }];

        let block = format_context(&sources);
        assert!(block.starts_with("[1] (Source: a.txt, relevance: 0.93)"));
        assert!(block.contains("alpha beta gamma"));
    }
}
