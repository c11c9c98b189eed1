use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::config::settings::WebSearchSettings;
use crate::core::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// The three fixed web-search branches of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    General,
    Penalties,
    Guidance,
}

impl SearchKind {
    pub const ALL: [SearchKind; 3] = [SearchKind::General, SearchKind::Penalties, SearchKind::Guidance];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::General => "general",
            SearchKind::Penalties => "penalties",
            SearchKind::Guidance => "guidance",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SearchKind::General => "general ethics guidance",
            SearchKind::Penalties => "penalty information",
            SearchKind::Guidance => "current guidance and precedents",
        }
    }

    pub fn query_for(&self, question: &str) -> String {
        let q = question.trim();
        match self {
            SearchKind::General => format!("federal ethics violation {} OGE guidance", q),
            SearchKind::Penalties => {
                format!("federal ethics penalties {} criminal civil administrative", q)
            }
            SearchKind::Guidance => format!("ethics {} reporting requirements precedent cases", q),
        }
    }
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked hits for `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError>;

    async fn health_check(&self) -> bool {
        true
    }
}

pub struct TavilySearch {
    client: Client,
    base_url: String,
    api_key: String,
    max_results: usize,
    search_depth: String,
    include_domains: Vec<String>,
    timeout_seconds: u64,
}

impl TavilySearch {
    pub fn new(settings: &WebSearchSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::backend("tavily", e))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            max_results: settings.max_results,
            search_depth: settings.search_depth.clone(),
            include_domains: settings.include_domains.clone(),
            timeout_seconds: settings.timeout_seconds,
        })
    }
}

#[async_trait]
impl WebSearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError> {
        let url = format!("{}/search", self.base_url);
        let body = json!({
            "query": query,
            "search_depth": self.search_depth,
            "max_results": self.max_results,
            "include_domains": self.include_domains,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout("tavily", self.timeout_seconds)
                } else {
                    ServiceError::transport("tavily", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: "tavily".to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::decode("tavily", e))?;

        let results = parse_tavily_results(&payload);
        Ok(filter_and_rank(results, &self.include_domains, self.max_results))
    }
}

fn parse_tavily_results(payload: &Value) -> Vec<SearchResult> {
    let items = payload
        .get("results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for item in items {
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let url = item
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let snippet = item
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let score = item.get("score").and_then(|v| v.as_f64()).map(|v| v as f32);
        if !url.is_empty() {
            results.push(SearchResult {
                title: if title.is_empty() { url.clone() } else { title },
                url,
                snippet,
                score,
            });
        }
    }

    results
}

/// Drops hits outside the allow-list (subdomains included) and orders the
/// rest by descending score; unscored hits keep their engine order.
pub fn filter_and_rank(
    results: Vec<SearchResult>,
    allowed_domains: &[String],
    max_results: usize,
) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = results
        .into_iter()
        .filter(|r| allowed_domains.is_empty() || host_allowed(&r.url, allowed_domains))
        .collect();

    kept.sort_by(|a, b| {
        let left = b.score.unwrap_or(f32::MIN);
        let right = a.score.unwrap_or(f32::MIN);
        left.partial_cmp(&right).unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(max_results);
    kept
}

fn host_allowed(url: &str, allowed_domains: &[String]) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    allowed_domains.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, score: Option<f32>) -> SearchResult {
        SearchResult {
            title: url.to_string(),
            url: url.to_string(),
            snippet: String::new(),
            score,
        }
    }

    #[test]
    fn query_templates() {
        let q = "accepting a $25 gift";
        assert_eq!(
            SearchKind::General.query_for(q),
            "federal ethics violation accepting a $25 gift OGE guidance"
        );
        assert_eq!(
            SearchKind::Penalties.query_for(q),
            "federal ethics penalties accepting a $25 gift criminal civil administrative"
        );
        assert_eq!(
            SearchKind::Guidance.query_for(q),
            "ethics accepting a $25 gift reporting requirements precedent cases"
        );
    }

    #[test]
    fn allow_list_filters_foreign_hosts() {
        let allowed = vec!["oge.gov".to_string(), "gsa.gov".to_string()];
        let results = vec![
            hit("https://www.oge.gov/web/oge.nsf/gifts", Some(0.5)),
            hit("https://example.com/oge.gov", Some(0.9)),
            hit("https://notoge.gov/page", Some(0.8)),
            hit("https://gsa.gov:443/policy", Some(0.7)),
        ];

        let kept = filter_and_rank(results, &allowed, 10);
        let urls: Vec<&str> = kept.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://gsa.gov:443/policy", "https://www.oge.gov/web/oge.nsf/gifts"]);
    }

    #[test]
    fn ranking_truncates_to_max_results() {
        let results = vec![
            hit("https://oge.gov/a", Some(0.1)),
            hit("https://oge.gov/b", Some(0.9)),
            hit("https://oge.gov/c", None),
        ];
        let kept = filter_and_rank(results, &[], 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].url, "https://oge.gov/b");
    }

    #[test]
    fn parses_tavily_payload() {
        let payload = json!({
            "results": [
                { "title": "Gifts", "url": "https://www.oge.gov/gifts", "content": "De minimis", "score": 0.83 },
                { "title": "No url" }
            ]
        });
        let results = parse_tavily_results(&payload);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "De minimis");
        assert_eq!(results[0].score, Some(0.83));
    }
}
