use clap::Parser;
use std::path::PathBuf;

use crate::common::config::DownloaderConfig;

/// M3U8 视频下载器
#[derive(Parser, Debug)]
#[command(name = "m3u8dl")]
#[command(version = "0.1")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "下载 M3U8 分片、合并并封装为单个视频文件", long_about = None)]
pub struct Cli {
    /// M3U8 清单链接
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub url: String,

    /// 输出文件名（不含扩展名）
    #[arg(long, value_name = "NAME")]
    #[arg(default_value = "video")]
    pub name: String,

    /// 配置文件 (JSON)
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 视频保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// 输出格式扩展名
    #[arg(long, value_name = "EXT")]
    #[arg(help = "最终文件的扩展名，如 mp4、mkv")]
    pub format: Option<String>,

    /// ffmpeg 可执行文件路径
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// 同时运行的任务上限，不填则不限制
    #[arg(long, value_name = "N")]
    pub max_tasks: Option<usize>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件中的同名项
    pub fn apply(&self, mut config: DownloaderConfig) -> DownloaderConfig {
        if let Some(dir) = &self.output_dir {
            config.storage_root = dir.clone();
        }
        if let Some(format) = &self.format {
            config.output_extension = format.clone();
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_path = ffmpeg.clone();
        }
        if self.max_tasks.is_some() {
            config.max_concurrent_tasks = self.max_tasks;
        }
        config
    }
}
