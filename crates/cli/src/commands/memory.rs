//! `memloop memory`: memory management commands.

use super::{load_config, open_stores};
use memloop_core::conversation::UserId;
use memloop_core::memory::NewSnippet;
use memloop_memory::MemoryRetriever;

pub async fn remember(user: &UserId, text: &str, importance: Option<f32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stores = open_stores(&config).await?;

    let mut snippet = NewSnippet::new(user.clone(), text);
    if let Some(importance) = importance {
        snippet = snippet.with_importance(importance);
    }
    let stored = stores.memory.append(snippet).await?;
    println!("Remembered #{} for {user}: {}", stored.ordinal, stored.text);
    Ok(())
}

pub async fn search(user: &UserId, query: &str, budget: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stores = open_stores(&config).await?;
    let retriever = MemoryRetriever::new(stores.memory.clone(), config.memory.lookback)
        .with_min_score(config.memory.min_score);

    println!("Searching memories of {user} for: \"{query}\" (budget {budget} chars)");
    println!();

    let results = retriever.retrieve_scored(user, query, budget).await?;
    if results.is_empty() {
        println!("   No memories found.");
        return Ok(());
    }
    for (i, scored) in results.iter().enumerate() {
        println!(
            "  {:>2}. [score: {:.2}] {} ({})",
            i + 1,
            scored.score,
            scored.snippet.text,
            scored.snippet.created_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub async fn stats(user: &UserId) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let stores = open_stores(&config).await?;
    let count = stores.memory.count(user).await?;

    println!("Memory Statistics");
    println!("=================");
    println!("  User:       {user}");
    println!("  Snippets:   {count}");
    println!("  Backend:    {}", config.memory.backend);
    if config.memory.backend == "sqlite" {
        let db_path = config.memory.database_path();
        match std::fs::metadata(&db_path) {
            Ok(meta) => println!("  DB file:    {} ({:.1} KB)", db_path.display(), meta.len() as f64 / 1024.0),
            Err(_) => println!("  DB file:    (not created yet)"),
        }
    }
    println!("  Lookback:   {} snippets", config.memory.lookback);
    println!("  Budget:     {} chars", config.memory.budget_chars);
    println!("  Min score:  {:.2}", config.memory.min_score);
    println!("  Auto-save:  {}", config.memory.auto_save);
    Ok(())
}
