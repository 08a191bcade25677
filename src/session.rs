//! Per-action request handlers.
//!
//! The hosting surface (CLI or HTTP) calls one handler per user action and
//! threads the [`ChatSession`] through explicitly — there is no ambient
//! session state anywhere in the core. Each handler finishes completely
//! before the next action is accepted; that single-request-at-a-time model
//! is all this application needs.

use anyhow::Result;

use crate::chat::ChatStore;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding;
use crate::index;
use crate::loader;
use crate::models::{ChatSession, Message};
use crate::synthesize;

/// Gate message shown when a question arrives before any index exists.
pub const PROCESS_FIRST: &str = "Please process the knowledge base first.";

/// Result of a "process knowledge base" action. The input-absent states
/// are ordinary outcomes the caller reports as warnings; only embedding
/// and index-build problems surface as errors.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The knowledge-base directory is missing or holds no PDF files.
    NoDocuments,
    /// PDFs were found but no text could be extracted from any of them.
    NoText,
    /// A fresh index was built and moved into place.
    Indexed {
        documents: usize,
        chunks: usize,
        skipped: usize,
    },
}

/// Ingest the knowledge base end to end: load PDFs, chunk, embed, build
/// and atomically install the index.
///
/// A failure partway through embedding or indexing leaves any prior index
/// untouched; the input-absent cases return a warning outcome without
/// touching anything.
pub async fn process_knowledge_base(config: &Config, api_key: &str) -> Result<ProcessOutcome> {
    let summary = loader::load_knowledge_base(&config.knowledge_base)?;

    if summary.documents == 0 && summary.skipped == 0 {
        return Ok(ProcessOutcome::NoDocuments);
    }
    if summary.text.trim().is_empty() {
        return Ok(ProcessOutcome::NoText);
    }

    let chunks = chunk_text(
        &summary.text,
        config.chunking.chunk_size,
        config.chunking.overlap,
    );
    if chunks.is_empty() {
        return Ok(ProcessOutcome::NoText);
    }

    let provider = embedding::create_provider(&config.embedding)?;

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let batch_vectors = embedding::embed_texts(&config.embedding, api_key, &texts).await?;
        vectors.extend(batch_vectors);
    }

    index::build_index(
        config,
        &chunks,
        &vectors,
        provider.model_name(),
        provider.dims(),
    )
    .await?;

    Ok(ProcessOutcome::Indexed {
        documents: summary.documents,
        chunks: chunks.len(),
        skipped: summary.skipped,
    })
}

/// Answer a question against the indexed knowledge base and append the
/// exchange to the session.
///
/// Before any external call, the index gate runs: no index means the
/// caller gets [`PROCESS_FIRST`] back and the session is left untouched.
/// Past the gate, retrieval or generation failures become a displayable
/// error string that is recorded in the conversation like any other
/// assistant turn (the user sees what happened and can retry).
///
/// If the session points at a saved conversation, the updated message list
/// is re-persisted after the assistant response.
pub async fn ask(
    config: &Config,
    store: &ChatStore,
    session: &mut ChatSession,
    owner: &str,
    api_key: &str,
    question: &str,
) -> Result<String> {
    if !index::index_exists(config) {
        return Ok(PROCESS_FIRST.to_string());
    }

    let reply = answer_question(config, api_key, question).await;

    session.messages.push(Message::user(question));
    session.messages.push(Message::assistant(reply.clone()));

    if let Some(name) = session.current_chat_name.clone() {
        store.save(owner, &name, &session.messages)?;
    }

    Ok(reply)
}

/// Run the retrieval-augmented generation flow, folding every failure into
/// a displayable string.
async fn answer_question(config: &Config, api_key: &str, question: &str) -> String {
    let contexts = match retrieve(config, api_key, question).await {
        Ok(contexts) => contexts,
        Err(e) => return format!("An error occurred: {e:#}"),
    };
    synthesize::generate_answer(&config.generation, api_key, question, &contexts).await
}

/// Embed the question and pull the top-k nearest chunks from the index.
async fn retrieve(config: &Config, api_key: &str, question: &str) -> Result<Vec<String>> {
    let query_vec = embedding::embed_query(&config.embedding, api_key, question).await?;

    let pool = index::open_index(config).await?;
    let result = index::search(&pool, &query_vec, config.retrieval.top_k).await;
    pool.close().await;

    Ok(result?.into_iter().map(|hit| hit.text).collect())
}

/// Name the session and persist its messages. Subsequent `ask` calls will
/// keep the file current.
pub fn save_conversation(
    store: &ChatStore,
    session: &mut ChatSession,
    owner: &str,
    name: &str,
) -> Result<(), crate::chat::ChatError> {
    store.save(owner, name, &session.messages)?;
    session.current_chat_name = Some(name.to_string());
    Ok(())
}

/// Load a saved conversation into a fresh session pointing at it.
pub fn load_conversation(
    store: &ChatStore,
    owner: &str,
    name: &str,
) -> Result<ChatSession, crate::chat::ChatError> {
    let messages = store.load(owner, name)?;
    Ok(ChatSession {
        messages,
        current_chat_name: Some(name.to_string()),
    })
}

/// Delete a saved conversation. The session keeps its in-memory messages
/// but drops the pointer if it referenced the deleted name.
pub fn delete_conversation(
    store: &ChatStore,
    session: &mut ChatSession,
    owner: &str,
    name: &str,
) -> Result<(), crate::chat::ChatError> {
    store.delete(owner, name)?;
    if session.current_chat_name.as_deref() == Some(name) {
        session.current_chat_name = None;
    }
    Ok(())
}
