use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{RemuxError, Remuxer};

/// 调用系统 ffmpeg 做流复制封装 (`-c copy`)
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// 检查 ffmpeg 是否可用
    pub async fn is_available(&self) -> bool {
        debug!("检查系统中是否安装了 ffmpeg...");
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), RemuxError> {
        if !self.is_available().await {
            error!("❌ 未检测到 ffmpeg，请确保系统中已安装并配置了 ffmpeg 可执行路径。");
            error!("安装方法参考：https://ffmpeg.org/download.html");
            return Err(RemuxError::ToolNotFound(self.ffmpeg_path.clone()));
        }

        // 任务被取消时 future 会被丢弃，子进程随之结束
        let output_result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-c")
            .arg("copy")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output_result.status.success() {
            let err_msg = String::from_utf8_lossy(&output_result.stderr);
            error!("❌ ffmpeg 封装失败，错误日志如下：\n{}", err_msg);
            let last_line = err_msg
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("ffmpeg 返回非零状态")
                .trim()
                .to_string();
            return Err(RemuxError::Failed(last_line));
        }

        info!("✅ 封装成功，输出文件: {:?}", output);
        Ok(())
    }
}
