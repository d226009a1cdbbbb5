//! Service facade wiring ingestion, retrieval, memory and guards

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedRwLockWriteGuard;

use crate::config::{DocQaConfig, EmbeddingBackend};
use crate::error::{Error, Result, MSG_UNSAFE_QUERY};
use crate::generation::Answerer;
use crate::ingestion::{hash_bytes, Ingestor};
use crate::memory::{MemoryRegistry, Turn};
use crate::providers::{
    EmbeddingProvider, HashingEmbedder, LlmProvider, OllamaClient, OllamaEmbedder, OllamaLlm,
};
use crate::retrieval::VectorIndex;
use crate::security::{QueryGuard, Redactor};
use crate::storage::{
    cleanup_expired_where, doc_id_for, CachedIndex, CleanupReport, IndexCache, StorageLayout,
};
use crate::types::{IngestReport, Reply};

use super::locks::DocLocks;

/// Reachability of the model services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    pub embedder: bool,
    pub llm: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.embedder && self.llm
    }
}

/// Document QA service
#[derive(Clone)]
pub struct DocQa {
    inner: Arc<DocQaInner>,
}

struct DocQaInner {
    /// Configuration
    config: DocQaConfig,
    /// Upload and index directories
    layout: StorageLayout,
    /// Load, chunk, embed, persist
    ingestor: Ingestor,
    /// Retrieve and generate
    answerer: Answerer,
    /// Shared embedder, kept for health checks
    embedder: Arc<dyn EmbeddingProvider>,
    /// Language model, kept for health checks
    llm: Arc<dyn LlmProvider>,
    /// Conversation memory per document
    memory: Arc<MemoryRegistry>,
    /// Ingest/answer exclusion per document
    locks: DocLocks,
    /// Content hash to existing index
    cache: IndexCache,
    /// Query sanitization
    guard: QueryGuard,
    /// Answer redaction
    redactor: Redactor,
    /// Upper bound on a single ingest or answer
    request_timeout: Duration,
}

impl DocQa {
    /// Create the service with the providers named in the configuration
    pub fn new(config: DocQaConfig) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(OllamaClient::new(&config.llm)?);

        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(
                client.clone(),
                config.llm.embed_model.clone(),
                config.embeddings.dimensions,
            )),
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embeddings.dimensions)?),
        };
        tracing::info!(
            "Embedder initialized ({} dimensions, using {})",
            embedder.dimensions(),
            embedder.name()
        );

        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::new(
            client,
            config.llm.generate_model.clone(),
            config.llm.temperature,
        ));

        Self::with_providers(config, embedder, llm)
    }

    /// Create the service around the given providers
    pub fn with_providers(
        config: DocQaConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let layout = StorageLayout::from_config(&config.storage);
        layout.ensure()?;

        let memory = Arc::new(MemoryRegistry::from_config(&config.memory));
        let ingestor = Ingestor::from_config(&config.chunking, &config.embeddings, embedder.clone())?;
        let answerer = Answerer::new(embedder.clone(), llm.clone(), memory.clone(), config.retrieval.clone())
            .with_history(config.memory.include_in_prompt);

        let guard = QueryGuard::from_config(&config.guard);
        let redactor = Redactor::from_config(&config.guard)?;
        let cache = IndexCache::new(config.storage.ttl_secs);
        let request_timeout = Duration::from_secs(config.llm.timeout_secs);

        tracing::info!(data_dir = %config.storage.data_dir.display(), "Document QA service ready");

        Ok(Self {
            inner: Arc::new(DocQaInner {
                config,
                layout,
                ingestor,
                answerer,
                embedder,
                llm,
                memory,
                locks: DocLocks::new(),
                cache,
                guard,
                redactor,
                request_timeout,
            }),
        })
    }

    pub fn config(&self) -> &DocQaConfig {
        &self.inner.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.inner.layout
    }

    pub fn memory(&self) -> &MemoryRegistry {
        &self.inner.memory
    }

    /// Index directory for `doc_id`
    pub fn index_dir(&self, doc_id: &str) -> PathBuf {
        self.inner.layout.index_dir(doc_id)
    }

    /// Conversation so far for `doc_id`
    pub fn history(&self, doc_id: &str) -> Vec<Turn> {
        self.inner.memory.history(doc_id)
    }

    /// Run `fut`, failing with `UpstreamTimeout` after the request timeout
    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.inner.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::UpstreamTimeout(self.inner.request_timeout.as_secs())),
        }
    }

    /// Copy `path` into the upload area and index it.
    ///
    /// A file whose bytes were indexed within the TTL is not embedded again.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let start = Instant::now();

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::unsupported(format!("{} has no file name", path.display())))?
            .to_string();
        let data = tokio::fs::read(path).await?;
        let content_hash = hash_bytes(&data);
        let doc_id = doc_id_for(&filename, &content_hash);

        if let Some(hit) = self.inner.cache.lookup(&content_hash) {
            if let Some(report) = self.cached_report(&hit, &filename, &content_hash, start).await {
                tracing::info!(doc_id = %hit.doc_id, "Reusing cached index");
                return Ok(report);
            }
        }

        let _guard = self.inner.locks.write(&doc_id).await;

        let upload_dir = self.inner.layout.upload_dir(&doc_id);
        let upload_path = upload_dir.join(&filename);
        tokio::fs::create_dir_all(&upload_dir).await?;
        tokio::fs::write(&upload_path, &data).await?;

        let index_dir = self.inner.layout.index_dir(&doc_id);
        // The swap is not bounded by the timeout so it always finishes under the write lock
        let result = match self.with_timeout(self.inner.ingestor.prepare(&upload_path)).await {
            Ok(prepared) => self.inner.ingestor.commit(prepared, &index_dir).await,
            Err(e) => Err(e),
        };

        let mut report = match result {
            Ok(report) => report,
            Err(e) => {
                if !VectorIndex::exists(&index_dir) {
                    if let Err(cleanup) = tokio::fs::remove_dir_all(&upload_dir).await {
                        tracing::debug!("Failed to remove rejected upload: {}", cleanup);
                    }
                }
                tracing::warn!(doc_id = %doc_id, "Ingestion failed: {}", e);
                return Err(e);
            }
        };

        // A rebuilt index invalidates earlier turns about it
        self.inner.memory.forget(&doc_id);
        self.inner.cache.insert(
            content_hash,
            CachedIndex {
                doc_id: doc_id.clone(),
                persist_dir: index_dir,
                ingested_at: Utc::now(),
            },
        );

        report.processing_time_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn cached_report(
        &self,
        hit: &CachedIndex,
        filename: &str,
        content_hash: &str,
        start: Instant,
    ) -> Option<IngestReport> {
        let _guard = self.inner.locks.read(&hit.doc_id).await;
        let dir = hit.persist_dir.clone();
        let index = tokio::task::spawn_blocking(move || VectorIndex::open(&dir))
            .await
            .ok()?
            .ok()?;
        if index.embed_model() != self.inner.embedder.name() {
            return None;
        }

        Some(IngestReport {
            doc_id: hit.doc_id.clone(),
            filename: filename.to_string(),
            chunks: index.len(),
            pages: None,
            content_hash: content_hash.to_string(),
            cached: true,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Answer `query` about `doc_id`.
    ///
    /// Never fails: errors become a degraded reply with a stable message,
    /// and the underlying error is only logged.
    pub async fn ask(&self, doc_id: &str, query: &str) -> Reply {
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        if !self.inner.guard.is_safe(query) {
            tracing::warn!(doc_id, "Rejected query containing a forbidden word");
            return Reply::canned(MSG_UNSAFE_QUERY, elapsed_ms());
        }

        let index_dir = self.inner.layout.index_dir(doc_id);
        let _guard = self.inner.locks.read(doc_id).await;
        let result = self
            .with_timeout(self.inner.answerer.answer(query, &index_dir, doc_id))
            .await;

        match result {
            Ok(mut result) => {
                result.answer = self.inner.redactor.redact(&result.answer);
                // Appended before the read lock drops, so a re-ingest forgets it
                self.inner
                    .memory
                    .get(doc_id)
                    .append(Turn::new(query, result.answer.clone()));
                Reply::answered(result, elapsed_ms())
            }
            Err(e) => {
                tracing::warn!(doc_id, retryable = e.is_retryable(), "Question failed: {}", e);
                Reply::canned(e.user_message(), elapsed_ms())
            }
        }
    }

    /// Delete uploads and indexes older than the TTL, with their memory and cache entries.
    ///
    /// Documents being ingested or queried are skipped until a later sweep.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let qa = self.clone();
        let report = tokio::task::spawn_blocking(move || qa.sweep_expired()).await?;
        let evicted = self.inner.cache.evict_expired();

        tracing::info!(
            removed = report.removed.len(),
            failed = report.failed,
            in_use = report.skipped,
            cache_evicted = evicted,
            "Cleanup finished"
        );
        Ok(report)
    }

    fn sweep_expired(&self) -> CleanupReport {
        let inner = &self.inner;
        let roots = inner.layout.roots();
        let ttl = Duration::from_secs(inner.config.storage.ttl_secs);

        // Upload and index directories share the doc_id, so one guard covers both
        let mut held: HashMap<String, OwnedRwLockWriteGuard<()>> = HashMap::new();
        let report = cleanup_expired_where(&roots, ttl, |path| {
            let Some(doc_id) = path.file_name().and_then(|n| n.to_str()) else {
                return true;
            };
            if held.contains_key(doc_id) {
                return true;
            }
            match inner.locks.try_write(doc_id) {
                Some(guard) => {
                    held.insert(doc_id.to_string(), guard);
                    true
                }
                None => {
                    tracing::debug!(doc_id, "Document in use, leaving it for the next sweep");
                    false
                }
            }
        });

        let vector_root = inner.layout.vector_root();
        for path in &report.removed {
            if path.parent() != Some(vector_root) {
                continue;
            }
            if let Some(doc_id) = path.file_name().and_then(|n| n.to_str()) {
                inner.memory.forget(doc_id);
                inner.cache.invalidate(doc_id);
            }
        }

        let swept: Vec<String> = held.into_keys().collect();
        for doc_id in &swept {
            inner.locks.remove(doc_id);
        }

        report
    }

    /// Probe the embedding and language model services
    pub async fn health(&self) -> HealthStatus {
        let (embedder, llm) = futures::join!(
            self.inner.embedder.health_check(),
            self.inner.llm.health_check()
        );
        HealthStatus {
            embedder: embedder.unwrap_or(false),
            llm: llm.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MSG_NOT_INDEXED, MSG_TRY_AGAIN, MSG_UNSUPPORTED};
    use async_trait::async_trait;

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("The admin password = hunter2 is in the doc.".to_string())
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    struct DownLlm;

    #[async_trait]
    impl LlmProvider for DownLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::upstream("connection refused at 10.1.2.3:11434"))
        }

        fn model(&self) -> &str {
            "down"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }
    }

    /// Sleeps past any one-second timeout before answering
    struct SlowLlm;

    #[async_trait]
    impl LlmProvider for SlowLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok("too late".to_string())
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    /// Holds the first completion until released
    struct GatedLlm {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl LlmProvider for GatedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("Office hours are nine to five.".to_string())
        }

        fn model(&self) -> &str {
            "gated"
        }
    }

    /// Hashing embedder that can be switched to stall
    struct StallingEmbedder {
        inner: HashingEmbedder,
        stall: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for StallingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.stall.load(std::sync::atomic::Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }
    }

    fn config(data_dir: &Path) -> DocQaConfig {
        let mut config = DocQaConfig::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.embeddings.backend = EmbeddingBackend::Hashing;
        config.embeddings.dimensions = 64;
        config
    }

    fn service(data_dir: &Path, llm: Arc<dyn LlmProvider>) -> DocQa {
        let mut config = DocQaConfig::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.embeddings.backend = EmbeddingBackend::Hashing;
        config.embeddings.dimensions = 128;
        let embedder = Arc::new(HashingEmbedder::new(128).unwrap());
        DocQa::with_providers(config, embedder, llm).unwrap()
    }

    fn write_doc(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ask_redacts_and_records_memory() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(EchoLlm));

        let file = write_doc(src.path(), "notes.txt", "The admin console is on port 8443.");
        let report = qa.ingest_file(&file).await.unwrap();
        assert!(qa.layout().upload_dir(&report.doc_id).join("notes.txt").exists());

        let reply = qa.ask(&report.doc_id, "Where is the admin console?").await;
        assert!(!reply.degraded);
        assert!(reply.answer.contains("password=[REDACTED]"));
        assert!(!reply.answer.contains("hunter2"));
        assert_eq!(reply.source_documents.len(), 1);

        let history = qa.history(&report.doc_id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].answer, reply.answer);
    }

    #[tokio::test]
    async fn test_unsafe_query_is_rejected() {
        let data = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(EchoLlm));

        let reply = qa.ask("anything", "What is the API token?").await;
        assert!(reply.degraded);
        assert_eq!(reply.answer, MSG_UNSAFE_QUERY);
        assert!(qa.history("anything").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_document_gets_canned_message() {
        let data = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(EchoLlm));

        let reply = qa.ask("never_uploaded_00000000", "What is this?").await;
        assert!(reply.degraded);
        assert_eq!(reply.answer, MSG_NOT_INDEXED);
    }

    #[tokio::test]
    async fn test_upstream_error_text_is_hidden() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(DownLlm));

        let file = write_doc(src.path(), "notes.txt", "Office hours are nine to five.");
        let report = qa.ingest_file(&file).await.unwrap();

        let reply = qa.ask(&report.doc_id, "When are office hours?").await;
        assert!(reply.degraded);
        assert_eq!(reply.answer, MSG_TRY_AGAIN);
        assert!(!reply.answer.contains("10.1.2.3"));
        assert!(qa.history(&report.doc_id).is_empty());

        let health = qa.health().await;
        assert!(health.embedder);
        assert!(!health.llm);
        assert!(!health.is_healthy());
    }

    #[tokio::test]
    async fn test_binary_upload_is_rejected_and_removed() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(EchoLlm));

        let file = src.path().join("photo.jpg");
        std::fs::write(&file, [0xffu8, 0xd8, 0xff, 0xe0, 0, 0x10]).unwrap();

        let err = qa.ingest_file(&file).await.unwrap_err();
        assert_eq!(err.user_message(), MSG_UNSUPPORTED);
        assert_eq!(std::fs::read_dir(qa.layout().upload_root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_same_bytes_hit_cache() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let qa = service(data.path(), Arc::new(EchoLlm));

        let file = write_doc(src.path(), "faq.txt", "Returns are accepted for 30 days.");
        let first = qa.ingest_file(&file).await.unwrap();
        let second = qa.ingest_file(&file).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.doc_id, second.doc_id);
        assert_eq!(first.chunks, second.chunks);
    }

    #[tokio::test]
    async fn test_cleanup_with_zero_ttl_removes_everything() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();

        let mut config = DocQaConfig::default();
        config.storage.data_dir = data.path().to_path_buf();
        config.storage.ttl_secs = 0;
        config.embeddings.dimensions = 32;
        let qa = DocQa::with_providers(
            config,
            Arc::new(HashingEmbedder::new(32).unwrap()),
            Arc::new(EchoLlm),
        )
        .unwrap();

        let file = write_doc(src.path(), "faq.txt", "Returns are accepted for 30 days.");
        let report = qa.ingest_file(&file).await.unwrap();
        qa.ask(&report.doc_id, "returns?").await;
        assert_eq!(qa.history(&report.doc_id).len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let cleaned = qa.cleanup().await.unwrap();

        assert_eq!(cleaned.removed.len(), 2);
        assert!(!qa.index_dir(&report.doc_id).exists());
        assert!(qa.history(&report.doc_id).is_empty());
    }

    #[tokio::test]
    async fn test_slow_model_times_out_with_canned_message() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut config = config(data.path());
        config.llm.timeout_secs = 1;
        let qa = DocQa::with_providers(config, Arc::new(HashingEmbedder::new(64).unwrap()), Arc::new(SlowLlm))
            .unwrap();

        let file = write_doc(src.path(), "notes.txt", "Office hours are nine to five.");
        let report = qa.ingest_file(&file).await.unwrap();

        let reply = qa.ask(&report.doc_id, "When are office hours?").await;
        assert!(reply.degraded);
        assert_eq!(reply.answer, MSG_TRY_AGAIN);
        assert!(reply.source_documents.is_empty());
        assert!(qa.history(&report.doc_id).is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_reingest_keeps_previous_index() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut config = config(data.path());
        config.llm.timeout_secs = 1;
        config.storage.ttl_secs = 0;
        let embedder = Arc::new(StallingEmbedder {
            inner: HashingEmbedder::new(64).unwrap(),
            stall: std::sync::atomic::AtomicBool::new(false),
        });
        let qa = DocQa::with_providers(config, embedder.clone(), Arc::new(EchoLlm)).unwrap();

        let file = write_doc(src.path(), "notes.txt", "Office hours are nine to five.");
        let report = qa.ingest_file(&file).await.unwrap();

        embedder.stall.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = qa.ingest_file(&file).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamTimeout(1)));
        embedder.stall.store(false, std::sync::atomic::Ordering::SeqCst);

        assert!(VectorIndex::exists(&qa.index_dir(&report.doc_id)));
        assert!(qa.layout().upload_dir(&report.doc_id).join("notes.txt").exists());
        let reply = qa.ask(&report.doc_id, "When are office hours?").await;
        assert!(!reply.degraded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reingest_during_answer_forgets_that_answer() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut config = config(data.path());
        config.storage.ttl_secs = 0;
        let llm = Arc::new(GatedLlm {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let qa = DocQa::with_providers(config, Arc::new(HashingEmbedder::new(64).unwrap()), llm.clone())
            .unwrap();

        let file = write_doc(src.path(), "notes.txt", "Office hours are nine to five.");
        let doc_id = qa.ingest_file(&file).await.unwrap().doc_id;

        let ask = {
            let qa = qa.clone();
            let doc_id = doc_id.clone();
            tokio::spawn(async move { qa.ask(&doc_id, "When are office hours?").await })
        };
        llm.entered.notified().await;

        let reingest = {
            let qa = qa.clone();
            tokio::spawn(async move { qa.ingest_file(&file).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        llm.release.notify_one();

        assert!(!ask.await.unwrap().degraded);
        assert!(!reingest.await.unwrap().unwrap().cached);
        assert!(qa.history(&doc_id).is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_skips_documents_in_use() {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut config = config(data.path());
        config.storage.ttl_secs = 0;
        let qa = DocQa::with_providers(config, Arc::new(HashingEmbedder::new(64).unwrap()), Arc::new(EchoLlm))
            .unwrap();

        let file = write_doc(src.path(), "faq.txt", "Returns are accepted for 30 days.");
        let doc_id = qa.ingest_file(&file).await.unwrap().doc_id;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let reader = qa.inner.locks.read(&doc_id).await;
        let busy = qa.cleanup().await.unwrap();
        assert!(busy.removed.is_empty());
        assert_eq!(busy.skipped, 2);
        assert!(qa.index_dir(&doc_id).exists());
        assert_eq!(qa.inner.locks.len(), 1);

        drop(reader);
        let idle = qa.cleanup().await.unwrap();
        assert_eq!(idle.removed.len(), 2);
        assert!(!qa.index_dir(&doc_id).exists());
        assert!(qa.inner.locks.is_empty());
    }
}
