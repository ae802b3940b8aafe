// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host client for CLI commands: a thin `reqwest` wrapper over the
//! `hakud` HTTP control surface. No retry/backoff here — that's the
//! dispatcher's job on the host side; the CLI reports whatever the host
//! says, once.

use haku_core::TaskId;
use haku_proto::{
    HealthResponse, LifecycleResponse, NodesResponse, SubmitRequest, SubmitResponse, TaskResponse,
};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach host: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("host rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Thin HTTP client for the host's control surface.
pub struct HostClient {
    base_url: String,
    http: reqwest::Client,
}

impl HostClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse, ClientError> {
        let resp = self.http.post(self.url("/submit")).json(req).send().await?;
        decode(resp).await
    }

    pub async fn status(&self, task_id: TaskId) -> Result<TaskResponse, ClientError> {
        let resp = self.http.get(self.url(&format!("/task/{task_id}"))).send().await?;
        decode(resp).await
    }

    pub async fn kill(&self, task_id: TaskId) -> Result<LifecycleResponse, ClientError> {
        let resp = self.http.post(self.url(&format!("/task/{task_id}/kill"))).send().await?;
        decode(resp).await
    }

    pub async fn pause(&self, task_id: TaskId) -> Result<LifecycleResponse, ClientError> {
        let resp = self.http.post(self.url(&format!("/task/{task_id}/pause"))).send().await?;
        decode(resp).await
    }

    pub async fn resume(&self, task_id: TaskId) -> Result<LifecycleResponse, ClientError> {
        let resp = self.http.post(self.url(&format!("/task/{task_id}/resume"))).send().await?;
        decode(resp).await
    }

    pub async fn stdout(&self, task_id: TaskId) -> Result<String, ClientError> {
        let resp = self.http.get(self.url(&format!("/task/{task_id}/stdout"))).send().await?;
        decode_text(resp).await
    }

    pub async fn stderr(&self, task_id: TaskId) -> Result<String, ClientError> {
        let resp = self.http.get(self.url(&format!("/task/{task_id}/stderr"))).send().await?;
        decode_text(resp).await
    }

    pub async fn nodes(&self) -> Result<NodesResponse, ClientError> {
        let resp = self.http.get(self.url("/nodes")).send().await?;
        decode(resp).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let resp = self.http.get(self.url("/health")).send().await?;
        decode(resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Rejected { status: status.as_u16(), body });
    }
    Ok(resp.json::<T>().await?)
}

async fn decode_text(resp: reqwest::Response) -> Result<String, ClientError> {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ClientError::Rejected { status: status.as_u16(), body });
    }
    Ok(body)
}
