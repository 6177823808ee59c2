//! The top-level scraping workflow.
//!
//! A single `start` step spawns the TechCrunch and Google News workflows as
//! child runs, awaits both, and returns their aggregated results. The
//! children run concurrently; either failure fails the parent run.

use serde_json::json;

use saffron_workflow::{StepDefinition, WorkflowDefinition};

use crate::{google_news, techcrunch};

pub const EVENT: &str = "scraper:start";

pub fn workflow() -> WorkflowDefinition {
  WorkflowDefinition::new("scraper").on_event(EVENT).step(
    StepDefinition::new("start", |ctx| async move {
      let techcrunch = ctx.spawn_workflow(techcrunch::EVENT, json!({})).await?;
      let google_news = ctx.spawn_workflow(google_news::EVENT, json!({})).await?;

      let (techcrunch, google_news) = tokio::join!(techcrunch.result(), google_news.result());

      Ok(json!({
        "techCrunchArticles": techcrunch?,
        "googleNewsArticles": google_news?,
      }))
    }),
  )
}
