//! Memory tools: thin wrappers over the RAG service and knowledge base
//! store, giving the agent search/get/store/forget verbs over its own
//! knowledge bases.

use async_trait::async_trait;
use prime_core::error::ToolError;
use prime_core::rag::RagService;
use prime_core::store::KnowledgeBaseStore;
use prime_core::tools::Tool;
use prime_core::types::RiskLevel;
use std::sync::Arc;
use uuid::Uuid;

pub struct MemorySearchTool {
    rag: Arc<RagService>,
    agent_id: Uuid,
}

impl MemorySearchTool {
    pub fn new(rag: Arc<RagService>, agent_id: Uuid) -> Self {
        Self { rag, agent_id }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search this agent's knowledge bases for chunks relevant to a query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "default": 5}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = args["query"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "memory_search".into(),
            reason: "'query' is required".into(),
        })?;
        let limit = args["limit"].as_u64().unwrap_or(5) as usize;
        let hits = self.rag.search_for_agent(self.agent_id, query, limit).await;
        serde_json::to_string(&hits).map_err(|e| ToolError::ExecutionFailed {
            name: "memory_search".into(),
            message: e.to_string(),
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct MemoryGetTool {
    store: Arc<dyn KnowledgeBaseStore>,
}

impl MemoryGetTool {
    pub fn new(store: Arc<dyn KnowledgeBaseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Fetch every indexed chunk for a given filename within a knowledge base, in chunk order."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "knowledge_base_id": {"type": "string"},
                "filename": {"type": "string"}
            },
            "required": ["knowledge_base_id", "filename"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let kb_id: Uuid = args["knowledge_base_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "memory_get".into(),
                reason: "'knowledge_base_id' must be a UUID string".into(),
            })?;
        let filename = args["filename"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "memory_get".into(),
            reason: "'filename' is required".into(),
        })?;

        let mut chunks = self.store.chunks_for_kb(kb_id, 2000).await;
        chunks.retain(|c| c.filename == filename);
        chunks.sort_by_key(|c| c.chunk_index);
        if chunks.is_empty() {
            return Err(ToolError::ExecutionFailed {
                name: "memory_get".into(),
                message: format!("no chunks found for '{filename}' in knowledge base {kb_id}"),
            });
        }
        Ok(chunks.into_iter().map(|c| c.content).collect::<Vec<_>>().join("\n"))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct MemoryStoreTool {
    rag: Arc<RagService>,
    default_kb_id: Option<Uuid>,
}

impl MemoryStoreTool {
    pub fn new(rag: Arc<RagService>, default_kb_id: Option<Uuid>) -> Self {
        Self { rag, default_kb_id }
    }
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Index new text into the agent's default knowledge base, chunking it for later retrieval."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {"type": "string"},
                "content": {"type": "string"},
                "knowledge_base_id": {"type": "string", "description": "Defaults to the agent's configured knowledge base"}
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let filename = args["filename"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "memory_store".into(),
            reason: "'filename' is required".into(),
        })?;
        let content = args["content"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "memory_store".into(),
            reason: "'content' is required".into(),
        })?;
        let kb_id = match args["knowledge_base_id"].as_str() {
            Some(s) => s.parse().map_err(|_| ToolError::InvalidArguments {
                name: "memory_store".into(),
                reason: "'knowledge_base_id' must be a UUID string".into(),
            })?,
            None => self.default_kb_id.ok_or_else(|| ToolError::InvalidArguments {
                name: "memory_store".into(),
                reason: "no knowledge_base_id given and no default configured".into(),
            })?,
        };

        let document_id = Uuid::new_v4();
        let chunks = self.rag.index_document(document_id, kb_id, filename, content).await;
        Ok(format!("indexed {} chunk(s) as document {document_id}", chunks.len()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}

pub struct MemoryForgetTool {
    store: Arc<dyn KnowledgeBaseStore>,
}

impl MemoryForgetTool {
    pub fn new(store: Arc<dyn KnowledgeBaseStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryForgetTool {
    fn name(&self) -> &str {
        "memory_forget"
    }

    fn description(&self) -> &str {
        "Remove every indexed chunk for a given filename within a knowledge base."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "knowledge_base_id": {"type": "string"},
                "filename": {"type": "string"}
            },
            "required": ["knowledge_base_id", "filename"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let kb_id: Uuid = args["knowledge_base_id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "memory_forget".into(),
                reason: "'knowledge_base_id' must be a UUID string".into(),
            })?;
        let filename = args["filename"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "memory_forget".into(),
            reason: "'filename' is required".into(),
        })?;

        let chunks = self.store.chunks_for_kb(kb_id, 2000).await;
        let document_ids: std::collections::HashSet<Uuid> = chunks
            .iter()
            .filter(|c| c.filename == filename)
            .map(|c| c.document_id)
            .collect();
        if document_ids.is_empty() {
            return Err(ToolError::ExecutionFailed {
                name: "memory_forget".into(),
                message: format!("no chunks found for '{filename}' in knowledge base {kb_id}"),
            });
        }
        for document_id in &document_ids {
            self.store.replace_chunks(*document_id, Vec::new()).await;
        }
        Ok(format!("forgot {} document(s) matching '{filename}'", document_ids.len()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }
}
