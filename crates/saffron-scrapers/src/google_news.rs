//! Google News top-stories scraping workflow.
//!
//! Same two-step shape as the TechCrunch workflow. Google News links are
//! relative (`./read/...`), so `parse_articles` rewrites them against the
//! source domain.

use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::info;
use url::Url;

use saffron_workflow::{StepContext, StepDefinition, StepError, WorkflowDefinition};

use crate::article::{Article, str_field};
use crate::client::fetch_html;

pub const EVENT: &str = "scraper:google_news_homepage";

const BASE_URL: &str = "https://news.google.com";
const TOP_STORIES_URL: &str = "https://news.google.com/topstories";
const MAX_ARTICLES: usize = 10;

pub fn workflow(client: reqwest::Client) -> WorkflowDefinition {
  WorkflowDefinition::new("google-news")
    .on_event(EVENT)
    .step(
      StepDefinition::new("fetch_homepage", move |_ctx| {
        let client = client.clone();
        async move {
          info!(url = TOP_STORIES_URL, "fetching Google News homepage articles");
          let html = fetch_html(&client, TOP_STORIES_URL).await?;
          let articles = extract_articles(&html);
          Ok(json!({"status": "success", "articles": articles}))
        }
      })
      .max_retries(3),
    )
    .step(
      StepDefinition::new("parse_articles", parse_articles).parents(["fetch_homepage"]),
    )
}

/// Body of the `parse_articles` step.
pub async fn parse_articles(ctx: StepContext) -> Result<Value, StepError> {
  let fetched = ctx
    .parent_output("fetch_homepage")
    .ok_or_else(|| StepError::terminal("missing output from fetch_homepage"))?;
  normalize_articles(fetched)
}

/// Pull raw records out of the top-stories markup. Records missing a link or
/// title are dropped; missing sources and timestamps get placeholder text.
fn extract_articles(html: &str) -> Vec<Value> {
  let document = Html::parse_document(html);

  let Ok(article_sel) = Selector::parse("article") else {
    return Vec::new();
  };
  let Ok(anchor) = Selector::parse("a[href]") else {
    return Vec::new();
  };
  let Ok(title) = Selector::parse("a.gPFEn") else {
    return Vec::new();
  };
  let Ok(source) = Selector::parse("div.vr1PYe") else {
    return Vec::new();
  };
  let Ok(time) = Selector::parse("time") else {
    return Vec::new();
  };

  let mut articles = Vec::new();
  for block in document.select(&article_sel) {
    let link = block
      .select(&anchor)
      .next()
      .and_then(|a| a.value().attr("href"));
    let title_text = block.select(&title).next().map(element_text);

    let (Some(link), Some(title_text)) = (link, title_text) else {
      continue;
    };

    articles.push(json!({
      "title": title_text,
      "author": block
        .select(&source)
        .next()
        .map(element_text)
        .unwrap_or_else(|| "Unknown Source".to_string()),
      "link": link,
      "published_time": block
        .select(&time)
        .next()
        .map(element_text)
        .unwrap_or_else(|| "Unknown Time".to_string()),
    }));
  }
  articles
}

/// Normalize raw records, rewriting relative links to absolute ones.
fn normalize_articles(fetched: &Value) -> Result<Value, StepError> {
  let Some(raw) = fetched
    .as_object()
    .and_then(|o| o.get("articles"))
    .and_then(|a| a.as_array())
  else {
    return Err(StepError::terminal(
      "invalid step output format from fetch_homepage",
    ));
  };

  let articles: Vec<Article> = raw
    .iter()
    .take(MAX_ARTICLES)
    .map(|record| Article {
      title: str_field(record, "title"),
      author: str_field(record, "author"),
      link: absolute_link(&str_field(record, "link")),
      excerpt: String::new(),
      published_time: str_field(record, "published_time"),
    })
    .collect();

  Ok(json!({"status": "success", "articles": articles}))
}

/// Resolve a relative Google News link against the source domain.
fn absolute_link(link: &str) -> String {
  if link.starts_with("http://") || link.starts_with("https://") {
    return link.to_string();
  }
  Url::parse(BASE_URL)
    .ok()
    .and_then(|base| base.join(link).ok())
    .map(|resolved| resolved.to_string())
    .unwrap_or_else(|| link.to_string())
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
  element.text().collect::<String>().trim().to_string()
}
