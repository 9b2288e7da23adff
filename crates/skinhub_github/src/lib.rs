//! # skinhub GitHub Storage
//!
//! Uses a GitHub repository as the content store: the player document and
//! every asset are files committed through the
//! [Contents API](https://docs.github.com/en/rest/repos/contents).
//!
//! The blob `sha` GitHub returns for a file is the document [`Revision`].
//! Updating a file requires passing the sha it currently has, so a stale
//! write is rejected by GitHub (`409`/`422`) and reported as
//! [`StorageError::Conflict`].
//!
//! ## Usage
//!
//! ```no_run
//! use skinhub_github::{GithubConfig, GithubStorage};
//!
//! let config = GithubConfig::new("ghp_...", "terrarpg/skins").unwrap();
//! let storage = GithubStorage::new(config).unwrap();
//! ```

use skinhub_core::prelude::*;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Clone, Debug)]
pub struct GithubConfig {
    /// Personal access token with `contents: write` on the repository.
    pub token: String,
    pub owner: String,
    pub repo: String,
    /// Defaults to `main`.
    pub branch: String,
    /// Prepended to every path, e.g. `textures/`.
    pub prefix: String,
    /// Defaults to [`DEFAULT_API_URL`]. Points at GitHub Enterprise or a mock server.
    pub api_url: String,
}

impl GithubConfig {
    /// `repository` is given as `owner/repo`.
    pub fn new(token: impl Into<String>, repository: &str) -> Result<Self, StorageError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
            .ok_or_else(|| {
                StorageError::Generic(format!(
                    "Repository must look like 'owner/repo', got '{repository}'"
                ))
            })?;

        Ok(Self {
            token: token.into(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: "main".to_string(),
            prefix: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
        })
    }
}

/// File metadata as returned by `GET /repos/{owner}/{repo}/contents/{path}`.
#[derive(Deserialize, Debug)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Blob {
    content: String,
    encoding: String,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteContents<'a> {
    message: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutResponseContent,
}

#[derive(Deserialize)]
struct PutResponseContent {
    sha: String,
}

fn decode_base64(content: &str) -> Result<Bytes, StorageError> {
    // GitHub wraps base64 payloads at 60 columns.
    let compact: String = content.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| StorageError::Generic(format!("Invalid base64 from GitHub: {e}")))
}

fn network_error(e: reqwest::Error) -> StorageError {
    error!("GitHub request failed: {e}");
    StorageError::Generic(format!("GitHub request failed: {e}"))
}

async fn unexpected_status(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!(%status, %body, "Unexpected GitHub response");
    StorageError::Generic(format!("GitHub returned {status}"))
}

#[derive(Clone)]
pub struct GithubStorage {
    client: Client,
    config: Arc<GithubConfig>,
}

impl GithubStorage {
    pub fn new(config: GithubConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent(concat!("skinhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Generic(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn key(&self, path: &str) -> String {
        format!("{}{path}", self.config.prefix)
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{tail}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if self.config.token.is_empty() {
            builder
        } else {
            builder.header("Authorization", format!("Bearer {}", self.config.token))
        }
    }

    /// `None` on 404. Every other failure is an error, an unreachable
    /// GitHub must never look like an empty repository.
    async fn get_contents(&self, path: &str) -> Result<Option<ContentFile>, StorageError> {
        let url = self.repo_url(&format!("contents/{}", self.key(path)));
        let response = self
            .request(Method::GET, &url)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("File not found on GitHub");
                Ok(None)
            }
            status if status.is_success() => response
                .json::<ContentFile>()
                .await
                .map(Some)
                .map_err(|e| StorageError::Generic(format!("Failed to parse GitHub response: {e}"))),
            _ => Err(unexpected_status(response).await),
        }
    }

    /// Files above 1 MB come back without inline content; those are read
    /// through the git blobs endpoint instead.
    async fn file_bytes(&self, file: ContentFile) -> Result<Bytes, StorageError> {
        if file.encoding.as_deref() == Some("base64") {
            return decode_base64(&file.content);
        }

        debug!(sha = %file.sha, "Falling back to the blobs API");
        let url = self.repo_url(&format!("git/blobs/{}", file.sha));
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(unexpected_status(response).await);
        }

        let blob: Blob = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("Failed to parse GitHub blob: {e}")))?;
        if blob.encoding != "base64" {
            return Err(StorageError::Generic(format!(
                "Unsupported blob encoding '{}'",
                blob.encoding
            )));
        }
        decode_base64(&blob.content)
    }

    /// Creates (`sha == None`) or updates a file, returns the new blob sha.
    async fn put_contents(
        &self,
        path: &str,
        data: &[u8],
        message: String,
        sha: Option<&str>,
    ) -> Result<String, StorageError> {
        let url = self.repo_url(&format!("contents/{}", self.key(path)));
        let body = PutContents {
            message,
            content: STANDARD.encode(data),
            branch: &self.config.branch,
            sha,
        };

        let response = self
            .request(Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() => response
                .json::<PutResponse>()
                .await
                .map(|r| r.content.sha)
                .map_err(|e| StorageError::Generic(format!("Failed to parse GitHub response: {e}"))),
            // 409: sha does not match the branch head, 422: sha missing or stale
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                debug!(status = %response.status(), "GitHub rejected the file sha");
                Err(StorageError::Conflict(path.to_string()))
            }
            _ => Err(unexpected_status(response).await),
        }
    }
}

impl StorageBackend for GithubStorage {
    #[instrument(skip(self), fields(repo = %self.config.repo))]
    async fn read_document(&self) -> Result<Option<StoredDocument>, StorageError> {
        let Some(file) = self.get_contents(self.document_path()).await? else {
            return Ok(None);
        };
        let revision = Revision(file.sha.clone());
        let data = self.file_bytes(file).await?;
        Ok(Some(StoredDocument { data, revision }))
    }

    #[instrument(skip(self, data), fields(repo = %self.config.repo, size = data.len()))]
    async fn write_document(
        &self,
        data: Bytes,
        expected: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StorageError> {
        let sha = self
            .put_contents(
                self.document_path(),
                &data,
                message.to_string(),
                expected.map(Revision::as_str),
            )
            .await?;
        debug!(%sha, "Metadata committed");
        Ok(Revision(sha))
    }

    #[instrument(skip(self), fields(repo = %self.config.repo))]
    async fn read_asset(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
        match self.get_contents(path).await? {
            Some(file) => self.file_bytes(file).await.map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, data), fields(repo = %self.config.repo, size = data.len()))]
    async fn write_asset(&self, path: &str, data: Bytes) -> Result<bool, StorageError> {
        if self.get_contents(path).await?.is_some() {
            debug!("Asset already committed");
            return Ok(false);
        }

        match self
            .put_contents(path, &data, format!("Upload {path}"), None)
            .await
        {
            Ok(_) => Ok(true),
            // A 409 may also mean the branch moved and nothing was written.
            Err(StorageError::Conflict(reason)) => {
                if self.get_contents(path).await?.is_some() {
                    debug!("Asset committed concurrently");
                    Ok(false)
                } else {
                    Err(StorageError::Conflict(reason))
                }
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(repo = %self.config.repo))]
    async fn delete_asset(&self, path: &str) -> Result<(), StorageError> {
        let Some(file) = self.get_contents(path).await? else {
            return Ok(());
        };

        let url = self.repo_url(&format!("contents/{}", self.key(path)));
        let body = DeleteContents {
            message: format!("Delete {path}"),
            sha: &file.sha,
            branch: &self.config.branch,
        };
        let response = self
            .request(Method::DELETE, &url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected_status(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const DOC_PATH: &str = "/repos/terrarpg/skins/contents/players.json";

    fn storage(server: &Server) -> GithubStorage {
        let mut config = GithubConfig::new("secret", "terrarpg/skins").unwrap();
        config.api_url = server.url();
        GithubStorage::new(config).unwrap()
    }

    fn on_main() -> Matcher {
        Matcher::UrlEncoded("ref".into(), "main".into())
    }

    #[test]
    fn repository_must_be_owner_slash_repo() {
        assert!(GithubConfig::new("t", "owner/repo").is_ok());
        assert!(GithubConfig::new("t", "owner").is_err());
        assert!(GithubConfig::new("t", "/repo").is_err());
        assert!(GithubConfig::new("t", "a/b/c").is_err());
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", DOC_PATH)
            .match_query(on_main())
            .match_header("authorization", "Bearer secret")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        assert!(storage(&server).read_document().await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_not_treated_as_missing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", DOC_PATH)
            .match_query(on_main())
            .with_status(503)
            .create_async()
            .await;

        let err = storage(&server).read_document().await.unwrap_err();
        assert!(matches!(err, StorageError::Generic(_)));
    }

    #[tokio::test]
    async fn document_is_decoded_with_its_sha_as_revision() {
        let mut server = Server::new_async().await;
        // wrapped the way GitHub wraps it
        let encoded = "eyJzdGV2ZSI6\nbnVsbH0=\n";
        server
            .mock("GET", DOC_PATH)
            .match_query(on_main())
            .with_status(200)
            .with_body(
                json!({ "sha": "abc123", "content": encoded, "encoding": "base64" }).to_string(),
            )
            .create_async()
            .await;

        let doc = storage(&server).read_document().await.unwrap().unwrap();
        assert_eq!(doc.revision, Revision("abc123".into()));
        assert_eq!(doc.data, Bytes::from_static(b"{\"steve\":null}"));
    }

    #[tokio::test]
    async fn large_files_are_read_through_the_blobs_api() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/terrarpg/skins/contents/skins/big.png")
            .match_query(on_main())
            .with_status(200)
            .with_body(json!({ "sha": "b10b", "content": "", "encoding": "none" }).to_string())
            .create_async()
            .await;
        let blob = server
            .mock("GET", "/repos/terrarpg/skins/git/blobs/b10b")
            .with_status(200)
            .with_body(json!({ "content": STANDARD.encode(b"big"), "encoding": "base64" }).to_string())
            .create_async()
            .await;

        let data = storage(&server).read_asset("skins/big.png").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"big")));
        blob.assert_async().await;
    }

    #[tokio::test]
    async fn document_write_sends_the_expected_sha() {
        let mut server = Server::new_async().await;
        let put = server
            .mock("PUT", DOC_PATH)
            .match_body(Matcher::PartialJson(json!({
                "sha": "old",
                "branch": "main",
                "message": "Update skin of Steve (players.json)",
                "content": STANDARD.encode(b"{}"),
            })))
            .with_status(200)
            .with_body(json!({ "content": { "sha": "new" } }).to_string())
            .create_async()
            .await;

        let rev = storage(&server)
            .write_document(
                Bytes::from_static(b"{}"),
                Some(&Revision("old".into())),
                "Update skin of Steve (players.json)",
            )
            .await
            .unwrap();
        assert_eq!(rev, Revision("new".into()));
        put.assert_async().await;
    }

    #[tokio::test]
    async fn stale_sha_is_a_conflict() {
        for status in [409, 422] {
            let mut server = Server::new_async().await;
            server
                .mock("PUT", DOC_PATH)
                .with_status(status)
                .with_body(r#"{"message":"is at 123 but expected old"}"#)
                .create_async()
                .await;

            let err = storage(&server)
                .write_document(
                    Bytes::from_static(b"{}"),
                    Some(&Revision("old".into())),
                    "Reset players (players.json)",
                )
                .await
                .unwrap_err();
            assert!(err.is_conflict(), "status {status}");
        }
    }

    #[tokio::test]
    async fn existing_assets_are_not_committed_again() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/terrarpg/skins/contents/skins/abc.png")
            .match_query(on_main())
            .with_status(200)
            .with_body(json!({ "sha": "s", "content": "", "encoding": "base64" }).to_string())
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/repos/terrarpg/skins/contents/skins/abc.png")
            .expect(0)
            .create_async()
            .await;

        let created = storage(&server)
            .write_asset("skins/abc.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(!created);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_asset_commit_is_a_conflict_when_nothing_landed() {
        let mut server = Server::new_async().await;
        let get = server
            .mock("GET", "/repos/terrarpg/skins/contents/skins/abc.png")
            .match_query(on_main())
            .with_status(404)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/terrarpg/skins/contents/skins/abc.png")
            .with_status(409)
            .with_body(r#"{"message":"reference update failed"}"#)
            .create_async()
            .await;

        let err = storage(&server)
            .write_asset("skins/abc.png", Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        get.assert_async().await;
    }

    #[tokio::test]
    async fn delete_passes_the_current_sha() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/terrarpg/skins/contents/capes/c.png")
            .match_query(on_main())
            .with_status(200)
            .with_body(json!({ "sha": "cafe", "content": "", "encoding": "base64" }).to_string())
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/repos/terrarpg/skins/contents/capes/c.png")
            .match_body(Matcher::PartialJson(json!({ "sha": "cafe", "branch": "main" })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        storage(&server).delete_asset("capes/c.png").await.unwrap();
        delete.assert_async().await;
    }
}
