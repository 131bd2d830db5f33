//! HTTP 转发能力：把每条成功构建的记录以表单形式推送到外部 HTTP 端点。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// 转发链路错误。
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("unsupported http method: {0}")]
    UnsupportedMethod(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        ForwardError::Transport(err.to_string())
    }
}

/// 转发支持的 HTTP 动词。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
            HttpMethod::Head => "head",
            HttpMethod::Options => "options",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ForwardError;

    /// 大小写不敏感。
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            "patch" => Ok(HttpMethod::Patch),
            "delete" => Ok(HttpMethod::Delete),
            "head" => Ok(HttpMethod::Head),
            "options" => Ok(HttpMethod::Options),
            _ => Err(ForwardError::UnsupportedMethod(value.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// 一次转发请求。
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    pub method: HttpMethod,
    pub url: String,
    /// 表单字段（url-encoded）。
    pub form: BTreeMap<String, String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// HTTP 转发器抽象。
#[async_trait]
pub trait HttpForwarder: Send + Sync {
    async fn forward(&self, request: &ForwardRequest) -> Result<(), ForwardError>;
}

/// 空转发器（用于占位）。
#[derive(Debug, Default)]
pub struct NoopForwarder;

#[async_trait]
impl HttpForwarder for NoopForwarder {
    async fn forward(&self, _request: &ForwardRequest) -> Result<(), ForwardError> {
        Ok(())
    }
}

/// 记录所有请求的转发器（用于测试）。
#[derive(Debug, Default)]
pub struct RecordingForwarder {
    requests: Mutex<Vec<ForwardRequest>>,
}

impl RecordingForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ForwardRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpForwarder for RecordingForwarder {
    async fn forward(&self, request: &ForwardRequest) -> Result<(), ForwardError> {
        let mut requests = self
            .requests
            .lock()
            .map_err(|_| ForwardError::Transport("lock failed".to_string()))?;
        requests.push(request.clone());
        Ok(())
    }
}

/// 基于 reqwest 的转发器实现。
#[derive(Clone)]
pub struct ReqwestForwarder {
    client: reqwest::Client,
}

impl ReqwestForwarder {
    pub fn new(timeout: Option<Duration>) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpForwarder for ReqwestForwarder {
    async fn forward(&self, request: &ForwardRequest) -> Result<(), ForwardError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .form(&request.form);
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_ref());
        }
        debug!(
            target: "m2i.forward",
            method = %request.method,
            url = %request.url,
            fields = request.form.len(),
            "http_forward_send"
        );
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForwardError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_methods_case_insensitively() {
        assert_eq!("POST".parse::<HttpMethod>().expect("method"), HttpMethod::Post);
        assert_eq!(" get ".parse::<HttpMethod>().expect("method"), HttpMethod::Get);
        assert_eq!("Options".parse::<HttpMethod>().expect("method"), HttpMethod::Options);
        assert!(matches!(
            "teleport".parse::<HttpMethod>(),
            Err(ForwardError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn maps_to_reqwest_method() {
        assert_eq!(reqwest::Method::from(HttpMethod::Patch), reqwest::Method::PATCH);
        assert_eq!(HttpMethod::Delete.to_string(), "delete");
    }
}
