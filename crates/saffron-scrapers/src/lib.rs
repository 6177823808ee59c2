//! Saffron Scrapers
//!
//! The scraping workflows that ship with the service: a top-level
//! orchestration workflow (`scraper:start`) that fans out to the TechCrunch
//! AI and Google News homepage scrapers and aggregates their articles.
//!
//! Everything here is ordinary application code registered as step bodies;
//! the scheduling, retries, and progress streaming come from
//! `saffron-engine`.

mod article;
mod client;
pub mod google_news;
pub mod scrape;
pub mod techcrunch;

pub use article::{Article, truncate_excerpt};
pub use client::build_client;
pub use scrape::EVENT as START_EVENT;

use saffron_engine::Engine;

/// Register the three scraping workflows with an engine.
pub fn register_all(engine: &Engine) -> anyhow::Result<()> {
  let client = build_client()?;
  engine.register(scrape::workflow())?;
  engine.register(techcrunch::workflow(client.clone()))?;
  engine.register(google_news::workflow(client))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use saffron_store::MemoryStore;

  #[test]
  fn workflows_register_cleanly() {
    let engine = Engine::new(Arc::new(MemoryStore::new()));
    register_all(&engine).unwrap();

    // Registering a second time collides on names and events.
    assert!(register_all(&engine).is_err());
  }
}
