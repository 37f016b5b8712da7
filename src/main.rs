use resumable_uploader::{
    config::AppConfig,
    logging,
    remote::HttpTransport,
    uploader::{
        folder::format_bytes, DigestSigner, FileSource, FolderUploader, ResumeData, ScanOptions,
        TransactionContext, UploadEvent, UploadSession, UploadState, Uploader,
    },
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 可断点续传的分片上传工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 要上传的文件或文件夹
    target: PathBuf,

    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

/// 续传数据文件路径（与上传文件同目录）
fn resume_path_for(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".resume.json");
    file.with_file_name(name)
}

/// 注册事件日志
fn log_events(session: &UploadSession) {
    session.on(|event| match event {
        UploadEvent::ChunkUpload {
            index,
            total_uploaded,
            ..
        } => info!("[分片#{}] ✓ 已上传 {}", index, format_bytes(*total_uploaded)),
        UploadEvent::ChunkError {
            index,
            status_code,
            message,
            attempt,
        } => warn!(
            "[分片#{}] 第 {} 次失败: status={:?}, {}",
            index, attempt, status_code, message
        ),
        UploadEvent::Done { remote_id } => info!("✅ 上传完成: remote_id={}", remote_id),
    });
}

async fn upload_file(uploader: &Uploader, config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    let resume_path = resume_path_for(path);

    let session = if resume_path.exists() {
        let resume = ResumeData::load_from_file(&resume_path).await?;
        let context = UploadState::from_resume_data(&resume)?.context().clone();
        info!("发现续传数据，继续上传: {:?}", resume_path);
        let source = Arc::new(FileSource::open(path).await?);
        uploader.from_resume_data(&resume, source, context)?
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let context = TransactionContext::new(&config.endpoint.url, &config.endpoint.currency)
            .with_tag("File-Name", name);
        uploader.from_file(path, context).await?
    };
    log_events(&session);

    let handle = session.start().await?;
    let result = tokio::select! {
        result = handle.wait() => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("收到中断信号，等待进行中的分片结束...");
            session.cancel();
            handle.wait().await
        }
    };

    match result {
        Ok(receipt) => {
            if resume_path.exists() {
                tokio::fs::remove_file(&resume_path).await?;
            }
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Err(e) => {
            match session.resume_data() {
                Ok(resume) => {
                    resume.save_to_file(&resume_path).await?;
                    info!("续传数据已保存: {:?}", resume_path);
                }
                Err(save_err) => warn!("无法导出续传数据: {}", save_err),
            }
            Err(e.into())
        }
    }
}

async fn upload_folder(uploader: Uploader, config: &AppConfig, root: &Path) -> anyhow::Result<()> {
    let endpoint = config.endpoint.clone();
    let folder = FolderUploader::new(uploader).with_scan_options(ScanOptions {
        skip_hidden: config.upload.skip_hidden_files,
        ..Default::default()
    });

    let result = folder
        .upload(root, |file| {
            TransactionContext::new(&endpoint.url, &endpoint.currency)
                .with_tag("File-Path", file.relative_key())
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 🔥 先加载配置，失败时使用默认配置（日志系统初始化后再报告）
    let (config, load_error) = match AppConfig::load_from_file(&args.config).await {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);
    if let Some(e) = load_error {
        warn!("配置文件加载失败，使用默认配置: {:#}", e);
    }

    info!(
        "resumable-uploader v{} 启动: 节点={}, 币种={}",
        env!("CARGO_PKG_VERSION"),
        config.endpoint.url,
        config.endpoint.currency
    );

    let signer = Arc::new(DigestSigner::new(config.endpoint.key.as_bytes().to_vec()));
    let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
    let uploader = Uploader::new(signer, transport, config.upload.clone())?;

    let result = if args.target.is_dir() {
        upload_folder(uploader, &config, &args.target).await
    } else {
        upload_file(&uploader, &config, &args.target).await
    };

    if let Err(e) = &result {
        error!("上传失败: {:#}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["resumable-uploader", "data.bin"]).unwrap();
        assert_eq!(args.target, PathBuf::from("data.bin"));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let args =
            Args::try_parse_from(["resumable-uploader", "-c", "other.toml", "site/"]).unwrap();
        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert_eq!(args.target, PathBuf::from("site/"));

        assert!(Args::try_parse_from(["resumable-uploader"]).is_err());
    }

    #[test]
    fn test_resume_path_for() {
        assert_eq!(
            resume_path_for(Path::new("/tmp/video.mp4")),
            PathBuf::from("/tmp/video.mp4.resume.json")
        );
    }
}
