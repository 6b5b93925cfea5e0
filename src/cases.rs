//! `wtf list`, `wtf show`, and `wtf similar`.
//!
//! Read-side CLI commands over the local database. They print to stdout
//! and never call the analysis provider.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::index::{SimilarityIndex, SqliteVectorStore};
use crate::migrate::create_schema;
use crate::models::{CasePage, CaseRecord};
use crate::store::{CaseStore, SqliteCaseStore};

async fn open_store(config: &Config) -> Result<SqliteCaseStore> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    Ok(SqliteCaseStore::new(pool))
}

/// Fetch one case, failing if it does not exist.
pub async fn get_case(config: &Config, id: &str) -> Result<CaseRecord> {
    let store = open_store(config).await?;
    match store.get(id).await? {
        Some(record) => Ok(record),
        None => bail!("case not found: {}", id),
    }
}

pub async fn list_cases(
    config: &Config,
    tag: Option<&str>,
    page: i64,
    limit: i64,
) -> Result<CasePage> {
    let store = open_store(config).await?;
    Ok(store.list(tag, page, limit).await?)
}

pub async fn run_list(config: &Config, tag: Option<&str>, page: i64, limit: i64) -> Result<()> {
    let page = list_cases(config, tag, page, limit).await?;

    if page.errors.is_empty() {
        println!("No cases found.");
        return Ok(());
    }

    let pages = (page.total + page.limit - 1) / page.limit;
    println!(
        "{} case(s), page {}/{}",
        page.total,
        page.page,
        pages.max(1)
    );
    println!();
    for case in &page.errors {
        println!("{}  {}", case.created_at, case.id);
        println!("    {}", case.case_name);
        println!("    $ {}", case.command);
        if !case.tags.is_empty() {
            println!("    tags: {}", case.tags.join(", "));
        }
    }

    Ok(())
}

pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let case = get_case(config, id).await?;

    println!("--- Case ---");
    println!("id:         {}", case.id);
    println!("case_name:  {}", case.case_name);
    println!("command:    {}", case.command);
    println!("tags:       {}", case.tags.join(", "));
    println!("created_at: {}", case.created_at.to_rfc3339());
    if let Some(ref vector_id) = case.vector_id {
        println!("vector_id:  {}", vector_id);
    }
    println!();

    println!("--- Error log ---");
    println!("{}", case.error_log);
    println!();

    if let Some(ref ctx) = case.code_context {
        println!("--- Code ({}:{}) ---", ctx.file_path, ctx.line_number);
        println!("{}", ctx.code_snippet);
        println!();
    }

    println!("--- Root cause ---");
    println!("{}", case.root_cause);
    println!();

    println!("--- Solution ---");
    println!("{}", case.solution);

    Ok(())
}

pub async fn run_similar(
    config: &Config,
    text: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embeddings are disabled; set [embedding] provider in the config");
    }
    let threshold = threshold.unwrap_or(config.retrieval.similarity_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("--threshold must be in [0.0, 1.0]");
    }
    let limit = limit.unwrap_or(config.retrieval.max_similar_cases);

    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    let index = SimilarityIndex::new(
        create_provider(&config.embedding)?,
        Arc::new(SqliteVectorStore::new(pool)),
        &config.retrieval,
        &config.embedding,
    );

    let matches = index.search(text, threshold, limit).await;
    if matches.is_empty() {
        println!("No similar cases at or above {:.2}.", threshold);
        return Ok(());
    }

    for (i, m) in matches.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, m.similarity, m.case_name);
        println!("   id:       {}", m.id);
        println!("   cause:    {}", m.root_cause);
        println!("   solution: {}", m.solution);
    }

    Ok(())
}
