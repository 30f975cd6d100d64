//! GitHub activity lookups. Best-effort enrichment: callers get `None` on failure,
//! never an error.

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK};
use tracing::{debug, warn};

use crate::config::{Config, GITHUB_COMMIT_WINDOW_DAYS};
use crate::error::Result;
use crate::types::RepoActivity;

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token,
        }
    }

    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Self {
        Self::new(http, cfg.github_url.clone(), cfg.github_token.clone())
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        req
    }

    /// Commits in the trailing 30 days (single page of up to 100) and contributor
    /// count. A non-2xx on either endpoint leaves that count at zero.
    pub async fn fetch_repo_activity(&self, owner: &str, repo: &str) -> Result<RepoActivity> {
        let since = (Utc::now() - ChronoDuration::days(GITHUB_COMMIT_WINDOW_DAYS))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let commits_url = format!(
            "{}/repos/{owner}/{repo}/commits?since={since}&per_page=100",
            self.base_url
        );
        let contrib_url = format!("{}/repos/{owner}/{repo}/contributors?per_page=1", self.base_url);

        let (commits_res, contrib_res) =
            tokio::join!(self.get(&commits_url).send(), self.get(&contrib_url).send());
        let commits_res = commits_res?;
        let contrib_res = contrib_res?;

        let mut commit_count_30d = 0;
        let mut last_commit_date = None;
        if commits_res.status().is_success() {
            let commits: Vec<serde_json::Value> = commits_res.json().await?;
            commit_count_30d = commits.len() as u32;
            last_commit_date = commits
                .first()
                .and_then(|c| c.pointer("/commit/author/date"))
                .and_then(|d| d.as_str())
                .map(str::to_string);
        } else {
            debug!(owner, repo, status = %commits_res.status(), "GitHub commits request failed");
        }

        let mut contributor_count = 0;
        if contrib_res.status().is_success() {
            let last_page = last_page_from_link(contrib_res.headers()).filter(|&n| n > 0);
            contributor_count = match last_page {
                Some(n) => n,
                None => contrib_res.json::<Vec<serde_json::Value>>().await?.len() as u32,
            };
        } else {
            debug!(
                owner,
                repo,
                status = %contrib_res.status(),
                "GitHub contributors request failed"
            );
        }

        Ok(RepoActivity {
            last_commit_date,
            commit_count_30d,
            contributor_count,
            repo_url: Some(format!("https://github.com/{owner}/{repo}")),
        })
    }

    /// Activity for a repository URL or `owner/repo` reference; `None` when the
    /// reference does not parse or the lookup fails.
    pub async fn fetch_activity_for_repo_url(&self, repo_url: &str) -> Option<RepoActivity> {
        let (owner, repo) = parse_repo_url(repo_url)?;
        match self.fetch_repo_activity(&owner, &repo).await {
            Ok(activity) => Some(activity),
            Err(e) => {
                warn!(repo_url, "GitHub lookup failed, continuing without activity: {e}");
                None
            }
        }
    }
}

/// Parse `https://github.com/owner/repo(.git)` or bare `owner/repo`.
pub fn parse_repo_url(url: &str) -> Option<(String, String)> {
    let u = url.trim().trim_end_matches('/');
    let path = match u.to_ascii_lowercase().find("github.com/") {
        Some(idx) => &u[idx + "github.com/".len()..],
        None => u,
    };
    let mut parts = path.split('/');
    let owner = parts.next()?;
    let repo = parts.next()?;
    if parts.next().is_some() || owner.is_empty() || repo.is_empty() {
        return None;
    }
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Repository URL for a DeFiLlama `github` entry. `owner/repo` is used as-is; a
/// bare `name` is guessed to be `name/name`. The guess is a best-effort default
/// and is often wrong for orgs whose main repo has a different name. Entries
/// that are already full GitHub URLs are reduced to their path first.
pub fn resolve_repo_url(github_slug: &str) -> Option<String> {
    let s = github_slug.trim();
    let s = match s.to_ascii_lowercase().find("github.com/") {
        Some(idx) => &s[idx + "github.com/".len()..],
        None => s,
    };
    let s = s.trim_end_matches('/');
    if s.is_empty() {
        return None;
    }
    if s.contains('/') {
        Some(format!("https://github.com/{s}"))
    } else {
        Some(format!("https://github.com/{s}/{s}"))
    }
}

/// Page number of the `rel="last"` link, if the header carries one.
pub fn last_page_from_link(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',')
        .find(|part| part.contains("rel=\"last\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            let url = part.get(start..end)?;
            let query = url.split_once('?')?.1;
            query
                .split('&')
                .filter_map(|kv| kv.split_once('='))
                .find(|(k, _)| *k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{http_client, stub};
    use axum::{
        extract::Path,
        http::{HeaderMap as AxumHeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::json;

    #[test]
    fn parses_repo_references() {
        assert_eq!(
            parse_repo_url("https://github.com/org/repo"),
            Some(("org".to_string(), "repo".to_string()))
        );
        assert_eq!(
            parse_repo_url("https://github.com/org/repo.git"),
            Some(("org".to_string(), "repo".to_string()))
        );
        assert_eq!(
            parse_repo_url("org/repo"),
            Some(("org".to_string(), "repo".to_string()))
        );
        assert_eq!(parse_repo_url("just-a-name"), None);
        assert_eq!(parse_repo_url("https://github.com/org"), None);
    }

    #[test]
    fn resolves_bare_name_to_name_name() {
        assert_eq!(
            resolve_repo_url("org/repo").as_deref(),
            Some("https://github.com/org/repo")
        );
        assert_eq!(
            resolve_repo_url("uniswap").as_deref(),
            Some("https://github.com/uniswap/uniswap")
        );
        assert_eq!(resolve_repo_url("  "), None);
    }

    #[test]
    fn full_url_entries_are_not_prefixed_twice() {
        assert_eq!(
            resolve_repo_url("https://github.com/org/repo").as_deref(),
            Some("https://github.com/org/repo")
        );
        assert_eq!(
            resolve_repo_url("github.com/aave/").as_deref(),
            Some("https://github.com/aave/aave")
        );
        assert_eq!(resolve_repo_url("https://github.com/"), None);
    }

    #[test]
    fn reads_last_page_from_link_header() {
        let mut h = HeaderMap::new();
        h.insert(
            LINK,
            r#"<https://api.github.com/repositories/1/contributors?per_page=1&page=2>; rel="next", <https://api.github.com/repositories/1/contributors?per_page=1&page=87>; rel="last""#
                .parse()
                .unwrap(),
        );
        assert_eq!(last_page_from_link(&h), Some(87));
        assert_eq!(last_page_from_link(&HeaderMap::new()), None);
    }

    fn router() -> Router {
        Router::new()
            .route(
                "/repos/:owner/:repo/commits",
                get(|Path((owner, _repo)): Path<(String, String)>| async move {
                    match owner.as_str() {
                        "active" => Json(json!([
                            {"sha": "a", "commit": {"author": {"date": "2026-10-01T00:00:00Z"}}},
                            {"sha": "b", "commit": {"author": {"date": "2026-09-20T00:00:00Z"}}}
                        ]))
                        .into_response(),
                        "dead" => Json(json!([])).into_response(),
                        _ => StatusCode::NOT_FOUND.into_response(),
                    }
                }),
            )
            .route(
                "/repos/:owner/:repo/contributors",
                get(|Path((owner, _repo)): Path<(String, String)>| async move {
                    let mut h = AxumHeaderMap::new();
                    if owner == "active" {
                        h.insert(
                            "link",
                            r#"<http://x/contributors?per_page=1&page=2>; rel="next", <http://x/contributors?per_page=1&page=12>; rel="last""#
                                .parse()
                                .unwrap(),
                        );
                    }
                    (h, Json(json!([{"login": "someone"}])))
                }),
            )
    }

    #[tokio::test]
    async fn fetches_activity_snapshot() {
        let base = stub::serve(router()).await;
        let gh = GithubClient::new(http_client().unwrap(), base, Some("t".into()));
        let a = gh.fetch_repo_activity("active", "proto").await.unwrap();
        assert_eq!(a.commit_count_30d, 2);
        assert_eq!(a.contributor_count, 12);
        assert_eq!(a.last_commit_date.as_deref(), Some("2026-10-01T00:00:00Z"));
        assert_eq!(a.repo_url.as_deref(), Some("https://github.com/active/proto"));
    }

    #[tokio::test]
    async fn zero_commits_is_not_absence() {
        let base = stub::serve(router()).await;
        let gh = GithubClient::new(http_client().unwrap(), base, None);
        let a = gh
            .fetch_activity_for_repo_url("https://github.com/dead/proto")
            .await
            .expect("snapshot present");
        assert_eq!(a.commit_count_30d, 0);
        assert_eq!(a.contributor_count, 1);
    }

    #[tokio::test]
    async fn transport_failure_yields_none() {
        // Nothing listens on this port once the listener is dropped.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gh = GithubClient::new(http_client().unwrap(), format!("http://{addr}"), None);
        assert!(gh.fetch_activity_for_repo_url("org/repo").await.is_none());
        assert!(gh.fetch_activity_for_repo_url("not a repo").await.is_none());
    }
}
