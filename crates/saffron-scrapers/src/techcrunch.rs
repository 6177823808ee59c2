//! TechCrunch AI homepage scraping workflow.
//!
//! Two steps: `fetch_homepage` (retried, network-bound) pulls the category
//! page and extracts raw article records; `parse_articles` (no retries)
//! normalizes them into [`Article`]s and truncates excerpts.

use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::info;

use saffron_workflow::{StepContext, StepDefinition, StepError, WorkflowDefinition};

use crate::article::{Article, str_field, truncate_excerpt};
use crate::client::fetch_html;

pub const EVENT: &str = "scraper:techcrunch_ai_homepage";

const HOMEPAGE_URL: &str = "https://techcrunch.com/category/artificial-intelligence/";
const MAX_ARTICLES: usize = 10;

pub fn workflow(client: reqwest::Client) -> WorkflowDefinition {
  WorkflowDefinition::new("techcrunch-ai")
    .on_event(EVENT)
    .step(
      StepDefinition::new("fetch_homepage", move |_ctx| {
        let client = client.clone();
        async move {
          info!(url = HOMEPAGE_URL, "fetching TechCrunch AI homepage articles");
          let html = fetch_html(&client, HOMEPAGE_URL).await?;
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

/// Pull raw article records out of the homepage markup, capped at the first
/// ten post-picker blocks. Records missing a title, author, or link are
/// dropped.
fn extract_articles(html: &str) -> Vec<Value> {
  let document = Html::parse_document(html);

  let Ok(picker) = Selector::parse("div.wp-block-tc23-post-picker") else {
    return Vec::new();
  };
  let Ok(title) = Selector::parse("h2.wp-block-post-title") else {
    return Vec::new();
  };
  let Ok(author) = Selector::parse("div.wp-block-tc23-author-card-name") else {
    return Vec::new();
  };
  let Ok(anchor) = Selector::parse("a[href]") else {
    return Vec::new();
  };
  let Ok(excerpt) = Selector::parse("div.wp-block-post-excerpt__excerpt") else {
    return Vec::new();
  };
  let Ok(time) = Selector::parse("time") else {
    return Vec::new();
  };

  let mut articles = Vec::new();
  for block in document.select(&picker).take(MAX_ARTICLES) {
    let title_el = block.select(&title).next();
    let author_text = block.select(&author).next().map(element_text);
    let link = title_el
      .and_then(|t| t.select(&anchor).next())
      .and_then(|a| a.value().attr("href"));

    let (Some(title_el), Some(author_text), Some(link)) = (title_el, author_text, link) else {
      continue;
    };

    articles.push(json!({
      "title": element_text(title_el),
      "author": author_text,
      "link": link,
      "excerpt": block.select(&excerpt).next().map(element_text).unwrap_or_default(),
      "published_time": block.select(&time).next().map(element_text).unwrap_or_default(),
    }));
  }
  articles
}

/// Normalize the fetch step's raw records into [`Article`]s.
///
/// The fetch output must be an object with an `articles` array; anything
/// else is a terminal failure rather than a retry candidate.
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
      link: str_field(record, "link"),
      excerpt: truncate_excerpt(&str_field(record, "excerpt")),
      published_time: str_field(record, "published_time"),
    })
    .collect();

  Ok(json!({"status": "success", "articles": articles}))
}

fn element_text(element: scraper::ElementRef<'_>) -> String {
  element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  const HOMEPAGE_FIXTURE: &str = r#"
    <html><body>
      <div class="wp-block-tc23-post-picker">
        <h2 class="wp-block-post-title"><a href="https://techcrunch.com/robots">Robots Rising</a></h2>
        <div class="wp-block-tc23-author-card-name">Jane Doe</div>
        <div class="wp-block-post-excerpt__excerpt">  An excerpt about robots.  </div>
        <time>2 hours ago</time>
      </div>
      <div class="wp-block-tc23-post-picker">
        <h2 class="wp-block-post-title"><a href="https://techcrunch.com/no-author">No Author Here</a></h2>
      </div>
      <div class="wp-block-tc23-post-picker">
        <h2 class="wp-block-post-title"><a href="https://techcrunch.com/bare">Bare Minimum</a></h2>
        <div class="wp-block-tc23-author-card-name">John Roe</div>
      </div>
    </body></html>
  "#;

  #[test]
  fn extracts_complete_records_and_skips_partial_ones() {
    let articles = extract_articles(HOMEPAGE_FIXTURE);
    assert_eq!(articles.len(), 2);

    assert_eq!(articles[0]["title"], "Robots Rising");
    assert_eq!(articles[0]["author"], "Jane Doe");
    assert_eq!(articles[0]["link"], "https://techcrunch.com/robots");
    assert_eq!(articles[0]["excerpt"], "An excerpt about robots.");
    assert_eq!(articles[0]["published_time"], "2 hours ago");

    // Optional fields default to empty strings.
    assert_eq!(articles[1]["title"], "Bare Minimum");
    assert_eq!(articles[1]["excerpt"], "");
    assert_eq!(articles[1]["published_time"], "");
  }

  #[test]
  fn extraction_caps_at_ten_blocks() {
    let block = r#"
      <div class="wp-block-tc23-post-picker">
        <h2 class="wp-block-post-title"><a href="https://techcrunch.com/x">T</a></h2>
        <div class="wp-block-tc23-author-card-name">A</div>
      </div>
    "#;
    let html = format!("<html><body>{}</body></html>", block.repeat(15));
    assert_eq!(extract_articles(&html).len(), 10);
  }

  #[test]
  fn normalize_truncates_long_excerpts() {
    let fetched = json!({
      "status": "success",
      "articles": [{
        "title": "A",
        "author": "B",
        "link": "l",
        "excerpt": "x".repeat(150),
        "published_time": "t",
      }],
    });

    let parsed = normalize_articles(&fetched).unwrap();
    let excerpt = parsed["articles"][0]["excerpt"].as_str().unwrap();
    assert_eq!(excerpt.len(), 103);
    assert_eq!(&excerpt[..100], "x".repeat(100));
    assert!(excerpt.ends_with("..."));
    assert_eq!(parsed["articles"][0]["title"], "A");
    assert_eq!(parsed["status"], "success");
  }

  #[test]
  fn normalize_defaults_missing_fields() {
    let fetched = json!({"articles": [{"title": "Only Title"}]});
    let parsed = normalize_articles(&fetched).unwrap();
    assert_eq!(parsed["articles"][0]["author"], "");
    assert_eq!(parsed["articles"][0]["excerpt"], "");
  }

  #[test]
  fn normalize_caps_at_ten_articles() {
    let records: Vec<Value> = (0..15).map(|i| json!({"title": format!("t{i}")})).collect();
    let parsed = normalize_articles(&json!({"articles": records})).unwrap();
    assert_eq!(parsed["articles"].as_array().unwrap().len(), 10);
  }

  #[test]
  fn normalize_rejects_malformed_parent_output() {
    for malformed in [json!("oops"), json!({"status": "success"}), json!({"articles": 5})] {
      let err = normalize_articles(&malformed).unwrap_err();
      assert!(!err.is_retryable());
      assert!(err.message().contains("invalid step output format"));
    }
  }
}
