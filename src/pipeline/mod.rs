//! Retrieval-augmented answer generation
//!
//! One pipeline is assembled per sweep configuration: an ephemeral
//! similarity index over that configuration's chunks, a top-K retriever,
//! and a prompt builder that packs retrieved text into a token budget
//! before handing the prompt to a generator.

use std::sync::Arc;

use tokenizers::Tokenizer;
use tracing::debug;

use crate::chunking::Chunk;
use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::llm::Generator;

const MIN_CONTEXT_TOKENS: usize = 512;
const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Answer prompt; `{context}` and `{question}` are substituted literally
pub const RAG_PROMPT_TEMPLATE: &str = "\
Answer the following question based on the provided context.
If the context does not contain the answer, try your best to answer in a \
general manner and tell the user to refer to the user guide and contact \
helpdesk support.

Context:
{context}

Question:
{question}

Answer:";

pub fn render_rag_prompt(context: &str, question: &str) -> String {
    RAG_PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question)
}

/// Tokens available for retrieved context after reserving generation room
/// and a safety margin, floored so degenerate settings still retrieve
/// something
pub fn context_token_budget(n_ctx: usize, max_new_tokens: usize, n_ctx_margin: usize) -> usize {
    MIN_CONTEXT_TOKENS.max(n_ctx.saturating_sub(max_new_tokens).saturating_sub(n_ctx_margin))
}

/// Count tokens with the tokenizer when one is available, estimating at
/// four characters per token otherwise
pub fn count_tokens(text: &str, tokenizer: Option<&Tokenizer>) -> usize {
    if let Some(tokenizer) = tokenizer {
        if let Ok(encoding) = tokenizer.encode(text, false) {
            return encoding.len();
        }
    }
    text.chars().count().div_ceil(APPROX_CHARS_PER_TOKEN)
}

/// Truncate `text` to at most `budget` tokens
///
/// With a tokenizer this binary-searches the longest character prefix that
/// fits; the approximate path cuts at the estimated character count.
fn truncate_to_tokens(text: &str, budget: usize, tokenizer: Option<&Tokenizer>) -> String {
    if count_tokens(text, tokenizer) <= budget {
        return text.to_string();
    }

    if tokenizer.is_none() {
        return text
            .chars()
            .take(budget.saturating_mul(APPROX_CHARS_PER_TOKEN))
            .collect();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut low = 0usize;
    let mut high = chars.len();
    while low < high {
        let mid = low + (high - low).div_ceil(2);
        let prefix: String = chars[..mid].iter().collect();
        if count_tokens(&prefix, tokenizer) <= budget {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    chars[..low].iter().collect()
}

/// Join retrieved chunk texts and cap the result at the token budget
pub fn pack_context(
    retrieved: &[RetrievedChunk],
    token_budget: usize,
    tokenizer: Option<&Tokenizer>,
) -> String {
    let joined = retrieved
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_to_tokens(&joined, token_budget, tokenizer)
}

/// One retrieval hit, carrying the parent document's stable ID
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
}

/// Top-K nearest-neighbor retrieval over one configuration's chunks
///
/// Chunks are inserted under their ordinal so search hits map back to the
/// chunk list by position.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
    chunks: Vec<Chunk>,
}

impl Retriever {
    pub fn build(provider: Arc<dyn EmbeddingProvider>, chunks: Vec<Chunk>) -> crate::Result<Self> {
        let index = VectorIndex::new(provider.dimension(), chunks.len());

        if !chunks.is_empty() {
            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = provider.embed_batch(&texts)?;
            for (ordinal, embedding) in embeddings.iter().enumerate() {
                index.insert(ordinal as u64, embedding)?;
            }
        }

        debug!("Built similarity index over {} chunks", chunks.len());
        Ok(Self {
            provider,
            index,
            chunks,
        })
    }

    pub fn retrieve(&self, query: &str, k: usize) -> crate::Result<Vec<RetrievedChunk>> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.provider.embed(query)?;
        let neighbors = self.index.search(&query_embedding, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|hit| {
                self.chunks.get(hit.id as usize).map(|chunk| RetrievedChunk {
                    chunk_id: chunk.chunk_id.clone(),
                    text: chunk.text.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Answer plus the retrieval detail the evaluation records
#[derive(Debug, Clone)]
pub struct PipelineAnswer {
    pub answer: String,
    pub retrieved: Vec<RetrievedChunk>,
}

/// Retrieve-then-generate pipeline for one configuration
pub struct RagPipeline {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    top_k: usize,
    context_token_budget: usize,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        top_k: usize,
        context_token_budget: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            top_k,
            context_token_budget,
        }
    }

    /// Answer a question grounded in retrieved context
    ///
    /// `tokenizer` is the chunking tokenizer when one is configured, so the
    /// context budget counts tokens the same way chunk bounds do.
    pub async fn answer(
        &self,
        question: &str,
        tokenizer: Option<&Tokenizer>,
    ) -> crate::Result<PipelineAnswer> {
        let retrieved = self.retriever.retrieve(question, self.top_k)?;
        let context = pack_context(&retrieved, self.context_token_budget, tokenizer);
        let prompt = render_rag_prompt(&context, question);
        let answer = self.generator.complete(&prompt).await?;

        Ok(PipelineAnswer { answer, retrieved })
    }
}
