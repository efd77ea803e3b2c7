use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;

use tdee_core::models::StateDocument;
use tdee_core::sync::RemoteStore;

/// Talks to a `tdee serve` instance (or anything speaking the same protocol).
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "tdee-cli/{} (tdee tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn document_url(&self, uid: &str) -> String {
        format!("{}/api/users/{uid}/document", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let detail = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));
    match detail {
        Some(detail) => format!("{status}: {detail}"),
        None => status.to_string(),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, uid: &str) -> Result<Option<StateDocument>> {
        let resp = self
            .authorize(self.client.get(self.document_url(uid)))
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("Remote fetch failed ({})", error_message(resp).await);
        }

        let doc = resp
            .json::<StateDocument>()
            .await
            .context("Failed to parse remote document")?;
        Ok(Some(doc))
    }

    async fn upload(&self, uid: &str, doc: &StateDocument) -> Result<()> {
        let resp = self
            .authorize(self.client.put(self.document_url(uid)))
            .json(doc)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.base_url))?;

        if !resp.status().is_success() {
            bail!("Remote upload failed ({})", error_message(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{AppState, build_router};
    use tdee_core::db::Database;
    use tdee_core::models::CalcState;

    async fn spawn_server(api_key: Option<&str>) -> String {
        let app = build_router(AppState::new(
            Database::open_in_memory().unwrap(),
            api_key.map(str::to_string),
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn sample_doc() -> StateDocument {
        let mut state = CalcState::default();
        state.profile.start_weight = 90.0;
        state.weeks[1].days[6].kcal = Some(2100.0);
        StateDocument::from(&state)
    }

    #[test]
    fn test_document_url() {
        let remote = HttpRemoteStore::new("http://localhost:8080/", None).unwrap();
        assert_eq!(
            remote.document_url("u1"),
            "http://localhost:8080/api/users/u1/document"
        );
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let url = spawn_server(Some("k3y")).await;
        let remote = HttpRemoteStore::new(&url, Some("k3y".to_string())).unwrap();

        assert!(remote.fetch("alice").await.unwrap().is_none());
        remote.upload("alice", &sample_doc()).await.unwrap();
        assert_eq!(remote.fetch("alice").await.unwrap(), Some(sample_doc()));
    }

    #[tokio::test]
    async fn test_wrong_key_is_an_error() {
        let url = spawn_server(Some("k3y")).await;
        let remote = HttpRemoteStore::new(&url, Some("nope".to_string())).unwrap();

        let err = remote.upload("alice", &sample_doc()).await.unwrap_err();
        assert!(format!("{err:#}").contains("401"));
        assert!(remote.fetch("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        // Reserve a port, then free it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = HttpRemoteStore::new(&format!("http://{addr}"), None).unwrap();
        assert!(remote.fetch("alice").await.is_err());
    }
}
