use std::sync::Arc;

use errors::ParseError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::client::HttpSource;

pub mod errors;
pub mod resolver;

/// M3U8 清单解析器：取回清单文本并按顺序给出分片地址
pub struct ManifestParser {
    client: Arc<dyn HttpSource>,
}

impl ManifestParser {
    pub fn new(client: Arc<dyn HttpSource>) -> Self {
        Self { client }
    }

    // 解析入口
    pub async fn parse(
        &self,
        manifest_location: &str,
        token: &CancellationToken,
    ) -> Result<Vec<Url>, ParseError> {
        let base = Url::parse(manifest_location.trim())
            .map_err(|e| ParseError::InvalidManifestLocation(format!("{manifest_location} ({e})")))?;

        debug!("开始获取 M3U8: {}", base);
        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ParseError::Cancelled),
            res = self.client.fetch(&base) => res.map_err(ParseError::ManifestFetchFailed)?,
        };

        let content = String::from_utf8(body).map_err(|_| ParseError::ManifestDecodeFailed)?;
        let segments = parse_content(&content, &base)?;
        info!("M3U8 解析完成，共 {} 个分片", segments.len());
        Ok(segments)
    }
}

/// 按行解析清单文本，保持分片在文件中的顺序
pub fn parse_content(content: &str, base: &Url) -> Result<Vec<Url>, ParseError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut segments = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if resolver::is_directive(trimmed) {
            continue;
        }

        match resolver::resolve_reference(trimmed, base) {
            Some(url) => segments.push(url),
            None => warn!("无法解析的分片引用，已跳过: {}", trimmed),
        }
    }

    if segments.is_empty() {
        return Err(ParseError::NoSegmentsFound);
    }
    Ok(segments)
}
