//! RAG Service (C9).
//!
//! Chunking for indexing and hybrid (embedding-or-keyword) search for
//! retrieval. Embeddings are opportunistic: when no embedder is
//! configured, retrieval falls back to keyword scoring.

use crate::store::KnowledgeBaseStore;
use crate::types::DocumentChunk;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub const CHUNK_WORDS: usize = 400;
pub const CHUNK_OVERLAP_WORDS: usize = 50;
pub const MAX_CHUNKS_PER_DOC: usize = 500;
pub const MAX_CHUNKS_PER_QUERY: usize = 2000;
pub const MAX_KEYWORDS: usize = 8;
pub const MIN_KEYWORD_LEN: usize = 2;

/// Splits `text` into ~[`CHUNK_WORDS`]-word chunks with [`CHUNK_OVERLAP_WORDS`]
/// overlap, hard-capped at [`MAX_CHUNKS_PER_DOC`].
pub fn chunk_text(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let stride = CHUNK_WORDS - CHUNK_OVERLAP_WORDS;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() && chunks.len() < MAX_CHUNKS_PER_DOC {
        let end = std::cmp::min(start + CHUNK_WORDS, words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// No embedder configured: retrieval always falls back to keyword mode.
pub struct NoEmbedder;

#[async_trait]
impl Embedder for NoEmbedder {
    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub content: String,
    pub score: f64,
    pub filename: String,
    pub chunk_index: usize,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > MIN_KEYWORD_LEN)
        .take(MAX_KEYWORDS)
        .collect()
}

fn keyword_score(content: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let lower = content.to_lowercase();
    let distinct_hits: HashSet<_> = keywords.iter().filter(|k| lower.contains(k.as_str())).collect();
    round4(distinct_hits.len() as f64 / keywords.len() as f64)
}

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

pub struct RagService {
    store: Arc<dyn KnowledgeBaseStore>,
    embedder: Arc<dyn Embedder>,
}

impl RagService {
    pub fn new(store: Arc<dyn KnowledgeBaseStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Replace a document's chunks after (re-)indexing, embedding each
    /// chunk when an embedder is configured.
    pub async fn index_document(
        &self,
        document_id: Uuid,
        knowledge_base_id: Uuid,
        filename: &str,
        text: &str,
    ) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        for (i, content) in chunk_text(text).into_iter().enumerate() {
            let embedding = self.embedder.embed(&content).await;
            chunks.push(DocumentChunk {
                id: Uuid::new_v4(),
                document_id,
                knowledge_base_id,
                chunk_index: i,
                content,
                filename: filename.to_string(),
                embedding,
            });
        }
        self.store.replace_chunks(document_id, chunks.clone()).await;
        chunks
    }

    pub async fn search(&self, kb_id: Uuid, query: &str, top_k: usize) -> Vec<SearchHit> {
        let chunks = self.store.chunks_for_kb(kb_id, MAX_CHUNKS_PER_QUERY).await;
        self.search_chunks(&chunks, query, top_k).await
    }

    /// Union top-k across every active KB for an agent, re-ranked by score.
    pub async fn search_for_agent(&self, agent_id: Uuid, query: &str, top_k: usize) -> Vec<SearchHit> {
        let kbs = self.store.active_kbs_for_agent(agent_id).await;
        let mut all_hits = Vec::new();
        for kb in kbs {
            all_hits.extend(self.search(kb.id, query, top_k).await);
        }
        all_hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        all_hits.truncate(top_k);
        all_hits
    }

    /// Formats hits as a "Relevant knowledge base context" system prefix.
    pub fn format_context(hits: &[SearchHit]) -> Option<String> {
        if hits.is_empty() {
            return None;
        }
        let mut out = String::from("Relevant knowledge base context:\n");
        for hit in hits {
            out.push_str(&format!("- [{}#{}] {}\n", hit.filename, hit.chunk_index, hit.content));
        }
        Some(out)
    }

    async fn search_chunks(&self, chunks: &[DocumentChunk], query: &str, top_k: usize) -> Vec<SearchHit> {
        let has_embeddings = chunks.iter().any(|c| c.embedding.is_some());
        if has_embeddings {
            let Some(query_embedding) = self.embedder.embed(query).await else {
                return self.keyword_search(chunks, query, top_k);
            };
            let mut scored: Vec<SearchHit> = chunks
                .iter()
                .filter_map(|c| {
                    let embedding = c.embedding.as_ref()?;
                    Some(SearchHit {
                        content: c.content.clone(),
                        score: cosine_similarity(embedding, &query_embedding),
                        filename: c.filename.clone(),
                        chunk_index: c.chunk_index,
                    })
                })
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(top_k);
            scored
        } else {
            self.keyword_search(chunks, query, top_k)
        }
    }

    fn keyword_search(&self, chunks: &[DocumentChunk], query: &str, top_k: usize) -> Vec<SearchHit> {
        let keywords = tokenize_query(query);
        let mut scored: Vec<SearchHit> = chunks
            .iter()
            .map(|c| SearchHit {
                content: c.content.clone(),
                score: keyword_score(&c.content, &keywords),
                filename: c.filename.clone(),
                chunk_index: c.chunk_index,
            })
            .filter(|h| h.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn chunk(content: &str, embedding: Option<Vec<f32>>) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            knowledge_base_id: Uuid::new_v4(),
            chunk_index: 0,
            content: content.to_string(),
            filename: "doc.txt".to_string(),
            embedding,
        }
    }

    #[test]
    fn chunk_text_splits_with_overlap_and_caps() {
        let text = (0..5000).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&text);
        assert!(chunks.len() <= MAX_CHUNKS_PER_DOC);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn chunk_text_empty_input_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
    }

    #[test]
    fn keyword_score_is_rounded_fraction_of_distinct_hits() {
        let keywords = vec!["rust".to_string(), "async".to_string(), "unrelated".to_string()];
        let score = keyword_score("this talks about rust and async programming", &keywords);
        assert_eq!(score, round4(2.0 / 3.0));
    }

    #[test]
    fn tokenize_query_filters_short_words_and_caps_count() {
        let keywords = tokenize_query("a an the rust async programming is fun to write code today now");
        assert!(keywords.len() <= MAX_KEYWORDS);
        assert!(!keywords.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn search_prefers_embeddings_when_present() {
        let store = Arc::new(InMemoryStore::new());
        let svc = RagService::new(store.clone(), Arc::new(NoEmbedder));
        let chunks = vec![
            chunk("about rust", Some(vec![1.0, 0.0])),
            chunk("about bananas", Some(vec![0.0, 1.0])),
        ];
        // embedder is NoEmbedder, so query embedding is None -> falls back to keyword mode
        let hits = svc.search_chunks(&chunks, "rust", 5).await;
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn keyword_search_returns_only_positive_scores() {
        let store = Arc::new(InMemoryStore::new());
        let svc = RagService::new(store, Arc::new(NoEmbedder));
        let chunks = vec![chunk("talks about rust", None), chunk("totally unrelated content", None)];
        let hits = svc.search_chunks(&chunks, "rust", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "talks about rust");
    }

    #[test]
    fn format_context_returns_none_for_empty_hits() {
        assert!(RagService::format_context(&[]).is_none());
    }

    #[test]
    fn format_context_includes_filename_and_chunk_index() {
        let hits = vec![SearchHit {
            content: "hello".into(),
            score: 1.0,
            filename: "a.txt".into(),
            chunk_index: 2,
        }];
        let ctx = RagService::format_context(&hits).unwrap();
        assert!(ctx.contains("a.txt#2"));
    }
}
