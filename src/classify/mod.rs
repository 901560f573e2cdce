pub mod decode;
pub mod prompts;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::llm::ChatBackend;
use crate::records::{ClassificationResult, Excerpt};

use decode::DecodeError;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier call failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("classifier did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("response index {0} is not in the batch")]
    UnknownIndex(u64),
    #[error("response index {0} appears more than once")]
    DuplicateIndex(u64),
    #[error("batch excerpt id {0} is not unique")]
    DuplicateExcerpt(u64),
}

/// Sends one batch to the classification service and maps the reply back
/// onto the batch's excerpt ids. No state is kept between calls.
pub struct ClassifierGateway {
    backend: Arc<dyn ChatBackend>,
    timeout: Duration,
}

impl ClassifierGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn classify(
        &self,
        batch: &[Excerpt],
        known_topics: &BTreeSet<String>,
        known_subtopics: &BTreeSet<String>,
    ) -> Result<Vec<ClassificationResult>, ClassifyError> {
        let mut batch_ids = HashSet::with_capacity(batch.len());
        for excerpt in batch {
            if !batch_ids.insert(excerpt.id) {
                return Err(ClassifyError::DuplicateExcerpt(excerpt.id));
            }
        }

        let prompt = prompts::build_prompt(batch, known_topics, known_subtopics);
        debug!(
            excerpts = batch.len(),
            topics = known_topics.len(),
            subtopics = known_subtopics.len(),
            prompt_chars = prompt.chars().count(),
            "sending batch to classifier"
        );

        let reply = tokio::time::timeout(
            self.timeout,
            self.backend.complete(prompts::SYSTEM_PROMPT, &prompt),
        )
        .await
        .map_err(|_| ClassifyError::Timeout(self.timeout))?
        .map_err(ClassifyError::Transport)?;

        let results = decode::decode_response(&reply)?;

        let mut answered = HashSet::with_capacity(results.len());
        for result in &results {
            if !batch_ids.contains(&result.id) {
                return Err(ClassifyError::UnknownIndex(result.id));
            }
            if !answered.insert(result.id) {
                return Err(ClassifyError::DuplicateIndex(result.id));
            }
        }

        debug!(
            answered = results.len(),
            omitted = batch.len() - results.len(),
            "classifier reply decoded"
        );
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::llm::ChatBackend;

    /// Replays canned replies in order and records every prompt it saw.
    pub struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Err(anyhow::anyhow!("no scripted reply left")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    fn excerpts(ids: &[u64]) -> Vec<Excerpt> {
        ids.iter()
            .map(|&id| Excerpt {
                id,
                text: format!("post {id}"),
            })
            .collect()
    }

    fn scripted_gateway(reply: Result<String, String>) -> (Arc<ScriptedBackend>, ClassifierGateway) {
        let backend = Arc::new(ScriptedBackend::new(vec![reply]));
        let gateway = ClassifierGateway::new(backend.clone(), Duration::from_secs(5));
        (backend, gateway)
    }

    #[tokio::test]
    async fn test_classify_maps_reply_to_batch_ids() {
        let reply = r#"Sure! {"Tweets": [
            {"index": 1, "text": "post 1", "topic": ["a"], "subtopic": ["b"], "sentiment": ["positive"]},
            {"index": 2, "text": "post 2", "topic": [], "subtopic": [], "sentiment": ["neutral"]}
        ]}"#;
        let (backend, gateway) = scripted_gateway(Ok(reply.to_string()));
        let results = gateway
            .classify(&excerpts(&[1, 2, 3]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(backend.calls(), 1);
        assert!(backend.prompts.lock().unwrap()[0].contains("3: post 3"));
    }

    #[tokio::test]
    async fn test_unknown_index_fails_batch() {
        let reply = r#"{"Tweets": [{"index": 9, "topic": ["a"], "subtopic": ["b"], "sentiment": []}]}"#;
        let (_, gateway) = scripted_gateway(Ok(reply.to_string()));
        let err = gateway
            .classify(&excerpts(&[1, 2]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::UnknownIndex(9)));
    }

    #[tokio::test]
    async fn test_duplicate_index_fails_batch() {
        let reply = r#"{"Tweets": [
            {"index": 1, "topic": ["a"], "subtopic": ["b"], "sentiment": []},
            {"index": 1, "topic": ["c"], "subtopic": ["d"], "sentiment": []}
        ]}"#;
        let (_, gateway) = scripted_gateway(Ok(reply.to_string()));
        let err = gateway
            .classify(&excerpts(&[1]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DuplicateIndex(1)));
    }

    #[tokio::test]
    async fn test_transport_error_and_garbage_fail_batch() {
        let (_, gateway) = scripted_gateway(Err("429 Too Many Requests".to_string()));
        let err = gateway
            .classify(&excerpts(&[1]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Transport(_)));

        let (_, gateway) = scripted_gateway(Ok("no json here".to_string()));
        let err = gateway
            .classify(&excerpts(&[1]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(DecodeError::NoJsonObject)));
    }

    #[tokio::test]
    async fn test_duplicate_excerpt_ids_rejected_before_sending() {
        let (backend, gateway) = scripted_gateway(Ok("{}".to_string()));
        let err = gateway
            .classify(&excerpts(&[4, 4]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::DuplicateExcerpt(4)));
        assert_eq!(backend.calls(), 0);
    }

    struct StalledBackend;

    #[async_trait::async_trait]
    impl ChatBackend for StalledBackend {
        async fn complete(&self, _system: &str, _prompt: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_service_times_out() {
        let gateway = ClassifierGateway::new(Arc::new(StalledBackend), Duration::from_secs(30));
        let err = gateway
            .classify(&excerpts(&[1]), &BTreeSet::new(), &BTreeSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Timeout(_)));
    }
}
