//! Grounded question answering: retrieve, assemble, generate.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::assemble::{self, Citation};
use crate::config::Config;
use crate::db;
use crate::error::CoreResult;
use crate::generation::{self, ResponseLength};
use crate::search;

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// Answer a question from indexed documents.
///
/// Retrieval misses are not an error: with no hits the generator is asked
/// to answer from an empty context and will say it cannot.
pub async fn answer_question(
    config: &Config,
    pool: &SqlitePool,
    question: &str,
    length: ResponseLength,
) -> CoreResult<AskResponse> {
    let hits = search::search_chunks(config, pool, question, config.retrieval.top_k).await?;
    let (context, citations) = assemble::assemble(
        &hits,
        config.retrieval.context_token_budget,
        config.retrieval.preview_chars,
    );

    let prompt = generation::build_answer_prompt(question, &context, length);
    let answer = generation::generate(&config.generation, &prompt, length.max_tokens()).await?;

    Ok(AskResponse { answer, citations })
}

pub async fn run_ask(config: &Config, question: &str, length: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question must not be empty.");
    }
    if !config.embedding.is_enabled() {
        bail!("ask requires embeddings. Set [embedding] provider in config.");
    }
    if !config.generation.is_enabled() {
        bail!("ask requires a generation provider. Set [generation] provider in config.");
    }

    let length = ResponseLength::parse(length)?;
    let pool = db::connect(config).await?;
    let response = answer_question(config, &pool, question, length).await?;

    println!("{}", response.answer);
    if !response.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &response.citations {
            let pages = if citation.page_numbers.is_empty() {
                String::new()
            } else {
                let list: Vec<String> =
                    citation.page_numbers.iter().map(|p| p.to_string()).collect();
                format!(" (page {})", list.join(", "))
            };
            println!("  - {}{}", citation.filename, pages);
        }
    }

    pool.close().await;
    Ok(())
}
