//! Discovery map: bot identity -> pull-mode (HTTP) endpoint. Filled once at startup by asking
//! each configured base URL who it is (`get_login_info`); never refreshed afterwards.

use dashmap::DashMap;
use serde::Deserialize;

use crate::config::AccessToken;
use crate::error::UpstreamError;
use crate::onebot::log::prefix;

/// Base URL and access token of one pull-mode bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullEndpoint {
    pub base_url: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct LoginInfoResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retcode: i64,
    data: Option<LoginInfo>,
}

#[derive(Debug, Deserialize)]
struct LoginInfo {
    user_id: i64,
    #[serde(default)]
    nickname: String,
}

#[derive(Default)]
pub struct Discovery {
    entries: DashMap<String, PullEndpoint>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query every base URL and record the ones that answer `status == "ok"`, `retcode == 0`.
    /// Unreachable or malformed endpoints are logged and skipped.
    pub async fn discover(client: &reqwest::Client, base_urls: &[String], tokens: &[AccessToken]) -> Self {
        let discovery = Self::new();
        for base_url in base_urls {
            let base_url = base_url.trim_end_matches('/');
            match fetch_login_info(client, base_url).await {
                Ok(info) => {
                    let self_id = info.user_id.to_string();
                    let access_token = tokens
                        .iter()
                        .find(|t| t.self_id == self_id)
                        .map(|t| t.token.clone())
                        .unwrap_or_default();
                    tracing::info!(
                        "{} event=bound base_url={} nickname={} token={}",
                        prefix(&self_id),
                        base_url,
                        info.nickname,
                        if access_token.is_empty() { "none" } else { "set" }
                    );
                    discovery.insert(
                        &self_id,
                        PullEndpoint {
                            base_url: base_url.to_string(),
                            access_token,
                        },
                    );
                }
                Err(e) => tracing::warn!(base_url, error = %e, "get_login_info failed, bot skipped"),
            }
        }
        discovery
    }

    pub fn insert(&self, self_id: &str, endpoint: PullEndpoint) {
        self.entries.insert(self_id.to_string(), endpoint);
    }

    pub fn get(&self, self_id: &str) -> Option<PullEndpoint> {
        self.entries.get(self_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn fetch_login_info(client: &reqwest::Client, base_url: &str) -> Result<LoginInfo, UpstreamError> {
    let endpoint = format!("{}/get_login_info", base_url);
    let res = client.get(&endpoint).send().await.map_err(|source| UpstreamError::Request {
        endpoint: endpoint.clone(),
        source,
    })?;
    if !res.status().is_success() {
        return Err(UpstreamError::Status {
            endpoint,
            status: res.status().as_u16(),
        });
    }
    let body: LoginInfoResponse = res.json().await.map_err(|source| UpstreamError::Decode {
        endpoint: endpoint.clone(),
        source,
    })?;
    match body.data {
        Some(info) if body.status == "ok" && body.retcode == 0 => Ok(info),
        _ => Err(UpstreamError::Rejected {
            endpoint,
            status: body.status,
            retcode: body.retcode,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ok_bots_with_matching_token() {
        let mut ok = mockito::Server::new_async().await;
        let mock = ok
            .mock("GET", "/get_login_info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok","retcode":0,"data":{"user_id":10001,"nickname":"guard"}}"#)
            .create_async()
            .await;
        let mut failing = mockito::Server::new_async().await;
        let _fail = failing
            .mock("GET", "/get_login_info")
            .with_status(200)
            .with_body(r#"{"status":"failed","retcode":100,"data":null}"#)
            .create_async()
            .await;

        let tokens = vec![AccessToken {
            self_id: "10001".into(),
            token: "t0k".into(),
        }];
        let client = reqwest::Client::new();
        let discovery = Discovery::discover(&client, &[format!("{}/", ok.url()), failing.url()], &tokens).await;

        assert_eq!(discovery.len(), 1);
        assert_eq!(
            discovery.get("10001"),
            Some(PullEndpoint {
                base_url: ok.url(),
                access_token: "t0k".into(),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn login_info_failures_are_typed() {
        let mut server = mockito::Server::new_async().await;
        let _down = server.mock("GET", "/down/get_login_info").with_status(502).create_async().await;
        let _junk = server
            .mock("GET", "/junk/get_login_info")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;
        let _empty = server
            .mock("GET", "/empty/get_login_info")
            .with_status(200)
            .with_body(r#"{"status":"ok","retcode":0}"#)
            .create_async()
            .await;
        let _refused = server
            .mock("GET", "/refused/get_login_info")
            .with_status(200)
            .with_body(r#"{"status":"failed","retcode":100,"data":null}"#)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let base = server.url();

        let err = fetch_login_info(&client, &format!("{base}/down")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 502, .. }));
        let err = fetch_login_info(&client, &format!("{base}/junk")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode { .. }));
        let err = fetch_login_info(&client, &format!("{base}/empty")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Rejected { retcode: 0, .. }));
        let err = fetch_login_info(&client, &format!("{base}/refused")).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Rejected { retcode: 100, ref status, .. } if status == "failed"));
        let err = fetch_login_info(&client, "http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Request { .. }));
    }

    #[tokio::test]
    async fn unreachable_base_url_is_skipped() {
        let client = reqwest::Client::new();
        let discovery = Discovery::discover(&client, &["http://127.0.0.1:1".to_string()], &[]).await;
        assert!(discovery.is_empty());
    }
}
