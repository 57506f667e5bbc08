//! 测试用的内存网络源与封装器
//!
//! 单元测试直接使用；集成测试通过 `test-utils` feature 引入。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use url::Url;

use crate::common::client::{ClientError, HttpSource};
use crate::post_process::{RemuxError, Remuxer};

/// 内存中的网络源，可以让某个地址的请求挂起
#[derive(Clone, Default)]
pub struct MemorySource {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    gates: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个包含 n 个相对分片的清单，分片内容为 `<segment i>`
    pub fn with_manifest(manifest_url: &str, segments: usize) -> Self {
        let source = Self::new();
        let base = Url::parse(manifest_url).unwrap();
        let mut manifest = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
        for i in 0..segments {
            manifest.push_str(&format!("#EXTINF:10.0,\nseg{i}.ts\n"));
            let url = base.join(&format!("seg{i}.ts")).unwrap();
            source.insert(url.as_str(), format!("<segment {i}>"));
        }
        manifest.push_str("#EXT-X-ENDLIST\n");
        source.insert(manifest_url, manifest);
        source
    }

    pub fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    /// 让对 url 的请求挂起，直到调用 release
    pub fn hold(&self, url: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, url: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(url) {
            gate.add_permits(1);
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }

    pub async fn wait_for_request(&self, url: &str) {
        for _ in 0..1000 {
            if self.request_count(url) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("没有等到请求: {url}");
    }
}

#[async_trait]
impl HttpSource for MemorySource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ClientError> {
        let key = url.to_string();
        self.requests.lock().unwrap().push(key.clone());

        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ClientError::Other(e.to_string()))?;
            permit.forget();
        }

        self.bodies
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(ClientError::Status {
                status: StatusCode::NOT_FOUND,
                url: key,
            })
    }
}

/// 直接复制容器文件作为封装结果，不依赖 ffmpeg
#[derive(Clone, Default)]
pub struct CopyRemuxer {
    pub fail: bool,
}

#[async_trait]
impl Remuxer for CopyRemuxer {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), RemuxError> {
        if self.fail {
            return Err(RemuxError::Failed("Invalid data found when processing input".to_string()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// 写出一部分输出后一直挂起，或者写出后直接失败
#[derive(Clone, Default)]
pub struct PartialRemuxer {
    pub fail: bool,
}

#[async_trait]
impl Remuxer for PartialRemuxer {
    async fn remux(&self, _input: &Path, output: &Path) -> Result<(), RemuxError> {
        tokio::fs::write(output, b"partial").await?;
        if self.fail {
            return Err(RemuxError::Failed("moov atom not found".to_string()));
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}
