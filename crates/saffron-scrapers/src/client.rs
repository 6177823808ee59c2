//! Outbound HTTP client shared by the fetch steps.

use std::time::Duration;

use anyhow::Context;
use reqwest::header;

use saffron_workflow::StepError;

/// Browser-like User-Agent; some news sites reject obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build the client used by every fetch step.
pub fn build_client() -> anyhow::Result<reqwest::Client> {
  let mut headers = header::HeaderMap::new();
  headers.insert(
    header::ACCEPT,
    header::HeaderValue::from_static(
      "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
  );
  headers.insert(
    header::ACCEPT_LANGUAGE,
    header::HeaderValue::from_static("en-US,en;q=0.5"),
  );

  reqwest::Client::builder()
    .timeout(Duration::from_secs(30))
    .user_agent(USER_AGENT)
    .default_headers(headers)
    .redirect(reqwest::redirect::Policy::limited(5))
    .build()
    .context("failed to build HTTP client")
}

/// Fetch a page body.
///
/// Transport errors and non-2xx statuses are retryable: the fetch steps
/// carry a retry ceiling precisely for these.
pub(crate) async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<String, StepError> {
  let response = client
    .get(url)
    .send()
    .await
    .map_err(|e| StepError::retryable(format!("error fetching {url}: {e}")))?;

  let response = response
    .error_for_status()
    .map_err(|e| StepError::retryable(format!("error fetching {url}: {e}")))?;

  response
    .text()
    .await
    .map_err(|e| StepError::retryable(format!("error reading body of {url}: {e}")))
}
