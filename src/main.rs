mod auth;
mod config;
mod events;
mod export;
mod grid;
mod http;
mod import;
mod parcel;
mod storage;
mod workbook;

use anyhow::{anyhow, bail, Context};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use log::info;
use sea_orm::DatabaseConnection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::{Caller, Role};
use crate::config::AppConfig;
use crate::events::{LogBus, LogLevel};
use crate::export::{export_file_name, trees_to_csv};
use crate::grid::selection::CORNERS_PER_PARCEL;
use crate::grid::{interpolate, Corner, CornerSelection, SelectionStep};
use crate::import::{ChunkedUploader, HttpTransport, ImportService, LocalTransport, UploadReport};
use crate::parcel::{ParcelService, PlacedTree};
use crate::storage::repository::AccessRepository;
use crate::storage::{establish_connection, StorageConfig};
use crate::workbook::{parse_sheet_name, parse_workbook_path};

#[derive(Parser, Debug)]
#[command(author, version, about = "Palm plantation grid mapping and yield import", long_about = None)]
struct Cli {
    /// 覆盖 DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动 HTTP 服务
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// 解析工作簿并分块导入
    Upload {
        file: PathBuf,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        /// 不经过 HTTP，以该用户身份直接写入本地数据库
        #[arg(long)]
        local_user: Option<String>,
    },
    /// 由四个角点 ("lat,lng") 生成树网格
    Grid {
        #[arg(long = "corner", required = true, allow_hyphen_values = true)]
        corners: Vec<Corner>,
        #[arg(long, default_value_t = 20)]
        rows: i32,
        #[arg(long, default_value_t = 20)]
        cols: i32,
        /// CSV 输出文件或目录；缺省打印到标准输出
        #[arg(long)]
        out: Option<PathBuf>,
        /// 保存为地块，例如 B1S2P3
        #[arg(long)]
        save: Option<String>,
    },
    /// 签发访问令牌
    IssueToken {
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        admin: bool,
    },
}

fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Warn)
        .filter_module("palmgrid", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .parse_default_env();

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let log_file = std::fs::File::create(dir.join(format!("app-{}.log", ts)))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

async fn connect(url: &str) -> anyhow::Result<Arc<DatabaseConnection>> {
    let db = establish_connection(&StorageConfig::new(url))
        .await
        .with_context(|| format!("数据库连接失败: {}", url))?;
    Ok(Arc::new(db))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    // 只有常驻服务写日志文件，其它命令输出到 stderr
    let log_dir = match cli.command {
        Command::Serve { .. } => config.log_dir.clone(),
        _ => None,
    };
    init_logging(log_dir.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let db = connect(&config.database_url).await?;
            let state = http::AppState::new(db, config.import);
            http::serve(&bind, state).await?;
        }
        Command::Upload {
            file,
            endpoint,
            token,
            chunk_size,
            local_user,
        } => {
            let chunk_size = chunk_size.unwrap_or(config.chunk_size);
            let report = match local_user {
                Some(user) => upload_local(&config, &file, chunk_size, &user).await?,
                None => {
                    let endpoint = endpoint.unwrap_or_else(|| config.api_url.clone());
                    let token = token
                        .or_else(|| config.token.clone())
                        .ok_or_else(|| anyhow!("缺少访问令牌：请设置 PALMGRID_TOKEN 或使用 --token"))?;
                    let transport = HttpTransport::new(endpoint, token);
                    run_upload(transport, &file, chunk_size).await?
                }
            };
            println!(
                "upload {}: {} records in {} chunks ({} processed, {} skipped)",
                report.upload_id,
                report.total_records,
                report.chunks_sent,
                report.total_processed,
                report.total_errors
            );
        }
        Command::Grid {
            corners,
            rows,
            cols,
            out,
            save,
        } => {
            run_grid(&config, &corners, rows, cols, out, save).await?;
        }
        Command::IssueToken { user, email, admin } => {
            let db = connect(&config.database_url).await?;
            let token = AccessRepository::issue_token(&db, &user, email).await?;
            if admin {
                AccessRepository::grant_role(&db, &user, Role::Admin.as_str()).await?;
            }
            info!("已为用户 {} 签发令牌（admin={}）", user, admin);
            println!("{}", token);
        }
    }

    Ok(())
}

async fn upload_local(
    config: &AppConfig,
    file: &Path,
    chunk_size: usize,
    user: &str,
) -> anyhow::Result<UploadReport> {
    let db = connect(&config.database_url).await?;
    let role = if AccessRepository::has_role(&db, user, Role::Admin.as_str()).await? {
        Role::Admin
    } else {
        Role::Viewer
    };
    let caller = Caller {
        user_id: user.to_string(),
        email: None,
        role,
    };
    let service = Arc::new(ImportService::new(db, config.import));
    run_upload(LocalTransport::new(service, caller), file, chunk_size).await
}

async fn run_upload<T>(transport: T, file: &Path, chunk_size: usize) -> anyhow::Result<UploadReport>
where
    T: import::ChunkTransport,
{
    let records = parse_workbook_path(file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown.xlsx".to_string());

    let bus = LogBus::new();
    let mut sub = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(entry) = sub.recv().await {
            let tag = match entry.level {
                LogLevel::Info => "info",
                LogLevel::Warning => "warn",
                LogLevel::Error => "error",
            };
            eprintln!("[{}] {:<5} {}", entry.timestamp.format("%H:%M:%S"), tag, entry.message);
            if let Some(details) = entry.details {
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&details).unwrap_or_else(|_| details.to_string())
                );
            }
        }
    });

    let uploader = ChunkedUploader::new(transport, bus.clone()).with_chunk_size(chunk_size);
    let result = uploader.upload(&records, &filename).await;

    bus.close();
    let _ = printer.await;
    Ok(result?)
}

async fn run_grid(
    config: &AppConfig,
    corners: &[Corner],
    rows: i32,
    cols: i32,
    out: Option<PathBuf>,
    save: Option<String>,
) -> anyhow::Result<()> {
    if corners.len() != CORNERS_PER_PARCEL {
        bail!("a parcel needs exactly 4 corners, got {}", corners.len());
    }

    let mut selection = CornerSelection::new();
    selection.start(0)?;
    let mut picked = None;
    for corner in corners {
        if let SelectionStep::Complete(done) = selection.click(corner.lat, corner.lng) {
            picked = Some(done);
        }
    }
    let picked = picked.ok_or_else(|| anyhow!("corner selection did not complete"))?;

    let points = interpolate(&picked, rows, cols)?;
    let now = Utc::now();
    let trees: Vec<PlacedTree> = points
        .iter()
        .map(|p| PlacedTree::from_point(p, now))
        .collect();
    let csv = trees_to_csv(&trees)?;

    match out {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(export_file_name(Local::now().date_naive()))
            } else {
                path
            };
            std::fs::write(&path, csv).with_context(|| format!("写入失败: {}", path.display()))?;
            info!("已导出 {} 棵树到 {}", trees.len(), path.display());
        }
        None => println!("{}", csv),
    }

    if let Some(name) = save {
        let key = parse_sheet_name(&name)
            .ok_or_else(|| anyhow!("parcel must look like B<n>S<n>P<n>, got {:?}", name))?;
        let db = connect(&config.database_url).await?;
        let saved = ParcelService::new(db).save_grid(key, &points).await?;
        println!("saved parcel {} (id {}, {} trees)", saved.key, saved.id, saved.tree_count);
    }

    Ok(())
}
