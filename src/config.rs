use crate::import::uploader::DEFAULT_CHUNK_SIZE;
use crate::import::{ImportSettings, TreeLookup};
use anyhow::{anyhow, Context};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://palmgrid.db?mode=rwc";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// 运行配置：先读 `.env`，再读环境变量；命令行参数在 main 中覆盖
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind: String,
    pub api_url: String,
    pub token: Option<String>,
    pub chunk_size: usize,
    pub import: ImportSettings,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取，空字符串视为未设置
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let chunk_size = parse_positive(get("PALMGRID_CHUNK_SIZE"), DEFAULT_CHUNK_SIZE)
            .context("PALMGRID_CHUNK_SIZE")?;
        let sub_batch_size = parse_positive(
            get("PALMGRID_SUB_BATCH_SIZE"),
            ImportSettings::default().sub_batch_size,
        )
        .context("PALMGRID_SUB_BATCH_SIZE")?;
        let tree_lookup = match get("PALMGRID_TREE_LOOKUP") {
            Some(raw) => raw
                .parse::<TreeLookup>()
                .map_err(|e| anyhow!(e))
                .context("PALMGRID_TREE_LOOKUP")?,
            None => TreeLookup::default(),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind: get("PALMGRID_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            api_url: get("PALMGRID_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: get("PALMGRID_TOKEN"),
            chunk_size,
            import: ImportSettings {
                sub_batch_size,
                tree_lookup,
            },
            log_dir: get("PALMGRID_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_positive(raw: Option<String>, default: usize) -> anyhow::Result<usize> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let n: usize = raw
        .parse()
        .with_context(|| format!("expected a positive integer, got {raw:?}"))?;
    if n == 0 {
        return Err(anyhow!("must be greater than 0"));
    }
    Ok(n)
}
