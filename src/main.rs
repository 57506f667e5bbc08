use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use m3u8_downloader::cli::Cli;
use m3u8_downloader::common::logger::{PrettyLogger, init_tracing};
use m3u8_downloader::downloader::progress::DownloadProgress;
use m3u8_downloader::post_process::ffmpeg::FfmpegRemuxer;
use m3u8_downloader::{
    DownloadManager, DownloaderConfig, TaskEvent, TaskStatus, log_error, log_info, log_success,
    log_warning,
};

/// 加载配置并准备存储目录
async fn prepare_config(args: &Cli) -> anyhow::Result<DownloaderConfig> {
    let config = match &args.config {
        Some(path) => DownloaderConfig::load(path)?,
        None => DownloaderConfig::default(),
    };
    let config = args.apply(config);

    info!("创建输出目录: {:?}", config.storage_root);
    tokio::fs::create_dir_all(&config.storage_root)
        .await
        .with_context(|| format!("创建输出目录失败: {}", config.storage_root.display()))?;
    Ok(config)
}

fn is_settled(event: &TaskEvent, id: Uuid) -> bool {
    match event {
        TaskEvent::Removed(removed) => *removed == id,
        _ => event
            .snapshot()
            .is_some_and(|snapshot| snapshot.id == id && snapshot.status.is_terminal()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = prepare_config(&args).await?;

    let remuxer = FfmpegRemuxer::new(&config.ffmpeg_path);
    if !remuxer.is_available().await {
        log_warning!(
            "未检测到 ffmpeg ({})，下载完成后的封装步骤将会失败",
            config.ffmpeg_path.display()
        );
    }
    let manager = DownloadManager::from_config(&config)?;

    let mut events = manager.subscribe();
    PrettyLogger::title("M3U8 下载");
    log_info!("保存目录: {}", manager.storage_root().display());
    log_info!("开始下载: {}", args.url);
    let id = manager.add_task(&args.name, &args.url).await;

    let mut progress = DownloadProgress::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log_warning!("收到中断信号，正在删除任务并清理临时文件...");
                manager.delete(id).await?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if event.task_id() != id {
                        continue;
                    }
                    progress.handle(&event);
                    if is_settled(&event, id) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("事件接收落后，跳过 {} 条", skipped);
                    if let Some(snapshot) = manager.task(id).await {
                        let event = TaskEvent::Updated(snapshot);
                        progress.handle(&event);
                        if is_settled(&event, id) {
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let snapshot = manager.task(id).await.context("任务已不存在")?;
    match snapshot.status {
        TaskStatus::Completed => {
            log_success!("下载完成！");
            if let Some(path) = manager.share_target(id).await {
                PrettyLogger::file_info("输出文件", path.display().to_string());
            }
            Ok(())
        }
        status => {
            let message = snapshot.error_message.unwrap_or_else(|| status.to_string());
            log_error!("下载失败: {}", message);
            anyhow::bail!(message)
        }
    }
}
