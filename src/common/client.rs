use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, ClientBuilder, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::common::config::DownloaderConfig;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP 请求失败，状态码: {status}，URL: {url}")]
    Status { status: StatusCode, url: String },

    #[error("{0}")]
    Other(String),
}

/// 下载核心对网络的唯一依赖：对一个地址发起 GET 并取回完整响应体
#[async_trait]
pub trait HttpSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError>;
}

// 基于 reqwest 的默认实现，不带认证信息，不做分段请求
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new(config: &DownloaderConfig) -> Result<Self, ClientError> {
        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(Self::get_default_headers(&config.user_agent))
            .build()?;
        Ok(Self { inner })
    }

    pub fn get_default_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        match HeaderValue::from_str(user_agent) {
            Ok(value) => {
                headers.insert(USER_AGENT, value);
            }
            Err(_) => warn!("User-Agent 含有非法字符，已忽略: {}", user_agent),
        }
        headers
    }

    fn check_response_status(response: &reqwest::Response, url: &Url) -> Result<(), ClientError> {
        let status = response.status();
        debug!("Response Status: {} <- {}", status, url);

        if status.is_success() {
            Ok(())
        } else {
            warn!("❌ 非成功状态码: {}, URL: {}", status, url);
            Err(ClientError::Status {
                status,
                url: url.to_string(),
            })
        }
    }
}

#[async_trait]
impl HttpSource for HttpClient {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        let response = self.inner.get(url.clone()).send().await?;
        Self::check_response_status(&response, url)?;

        let body = response.bytes().await?;
        debug!("取回 {} 字节: {}", body.len(), url);
        Ok(body.to_vec())
    }
}
