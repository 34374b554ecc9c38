//! Hosting-platform collaborator: manifest fetching, repository provisioning
//! and role grants.
//!
//! The engine only depends on the [`Forge`] trait; [`RestForge`] implements it
//! against a Gitee-style REST API. Tests substitute a recording fake.
use crate::model::{Role, Visibility};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid forge URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("forge returned {status} for {operation}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },
    #[error("blob content is not valid base64: {0}")]
    Content(#[from] base64::DecodeError),
}

pub type ForgeResult<T> = Result<T, ForgeError>;

/// A fetched manifest file: its content-derived fingerprint plus the decoded
/// bytes at that fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub fingerprint: String,
    pub content: Vec<u8>,
}

/// Result of a repository creation attempt. A conflict (already exists) is a
/// success from the engine's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Operations the reconciliation engine requires from the hosting platform.
#[async_trait]
pub trait Forge: Send + Sync {
    /// One-shot read of the watched file plus its fingerprint.
    async fn fetch_manifest(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> ForgeResult<ManifestFile>;

    /// Resolve a fingerprint to raw bytes.
    async fn fetch_blob(&self, owner: &str, repo: &str, fingerprint: &str) -> ForgeResult<Vec<u8>>;

    async fn create_repository(
        &self,
        owner: &str,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> ForgeResult<CreateOutcome>;

    async fn grant_role(&self, owner: &str, repo: &str, user: &str, role: Role) -> ForgeResult<()>;

    async fn revoke_role(&self, owner: &str, repo: &str, user: &str, role: Role)
        -> ForgeResult<()>;
}

#[derive(Clone)]
pub struct RestForge {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for RestForge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestForge")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResp {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct BlobResp {
    #[serde(default)]
    content: String,
}

impl RestForge {
    pub fn new(base_url: &str, token: String) -> ForgeResult<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self::with_base_url(base_url, token))
    }

    pub fn with_base_url(base_url: Url, token: String) -> Self {
        let http = Client::builder()
            .user_agent("repo-steward/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
        }
    }

    fn endpoint(&self, path: &str) -> ForgeResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Platform permission name for a role. Viewers and reporters both map to
    /// read access; the distinction lives in the privilege store.
    fn permission(role: Role) -> &'static str {
        match role {
            Role::Manager => "admin",
            Role::Developer => "push",
            Role::Viewer | Role::Reporter => "pull",
        }
    }

    /// Blob bodies arrive base64-encoded, possibly with embedded newlines.
    fn decode_content(content: &str) -> ForgeResult<Vec<u8>> {
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(BASE64.decode(compact.as_bytes())?)
    }
}

#[async_trait]
impl Forge for RestForge {
    async fn fetch_manifest(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> ForgeResult<ManifestFile> {
        let url = self.endpoint(&format!("repos/{owner}/{repo}/contents/{path}"))?;
        let res = self
            .http
            .get(url)
            .query(&[("ref", git_ref), ("access_token", &self.token)])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ForgeError::Status {
                operation: "fetch manifest",
                status: res.status(),
            });
        }
        let body: ContentsResp = res.json().await?;
        let content = Self::decode_content(&body.content)?;
        Ok(ManifestFile {
            fingerprint: body.sha,
            content,
        })
    }

    async fn fetch_blob(&self, owner: &str, repo: &str, fingerprint: &str) -> ForgeResult<Vec<u8>> {
        let url = self.endpoint(&format!("repos/{owner}/{repo}/git/blobs/{fingerprint}"))?;
        let res = self
            .http
            .get(url)
            .query(&[("access_token", &self.token)])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ForgeError::Status {
                operation: "fetch blob",
                status: res.status(),
            });
        }
        let body: BlobResp = res.json().await?;
        Self::decode_content(&body.content)
    }

    async fn create_repository(
        &self,
        owner: &str,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> ForgeResult<CreateOutcome> {
        let url = self.endpoint(&format!("orgs/{owner}/repos"))?;
        info!(owner, name, "creating repository");
        let body = json!({
            "access_token": self.token,
            "name": name,
            "description": description,
            "private": visibility == Visibility::Private,
            "has_issues": true,
            "has_wiki": true,
        });
        let res = self.http.post(url).json(&body).send().await?;
        match res.status() {
            s if s.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            status => Err(ForgeError::Status {
                operation: "create repository",
                status,
            }),
        }
    }

    async fn grant_role(&self, owner: &str, repo: &str, user: &str, role: Role) -> ForgeResult<()> {
        let url = self.endpoint(&format!("repos/{owner}/{repo}/collaborators/{user}"))?;
        let body = json!({
            "access_token": self.token,
            "permission": Self::permission(role),
        });
        let res = self.http.put(url).json(&body).send().await?;
        if !res.status().is_success() {
            return Err(ForgeError::Status {
                operation: "grant role",
                status: res.status(),
            });
        }
        Ok(())
    }

    async fn revoke_role(
        &self,
        owner: &str,
        repo: &str,
        user: &str,
        _role: Role,
    ) -> ForgeResult<()> {
        let url = self.endpoint(&format!("repos/{owner}/{repo}/collaborators/{user}"))?;
        let res = self
            .http
            .delete(url)
            .query(&[("access_token", &self.token)])
            .send()
            .await?;
        // Revoking an already-absent collaborator is not a failure.
        if !res.status().is_success() && res.status() != StatusCode::NOT_FOUND {
            return Err(ForgeError::Status {
                operation: "revoke role",
                status: res.status(),
            });
        }
        Ok(())
    }
}
