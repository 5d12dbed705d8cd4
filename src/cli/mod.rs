//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cachepool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, global = true, default_value = "info", help = "Default log filter")]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "check", about = "Validate a configuration file")]
    Check(CheckArgs),

    #[command(name = "publish", about = "Broadcast a cache write on the sync bus")]
    Publish(PublishArgs),

    #[command(name = "listen", about = "Apply sync bus writes to a local cache until Ctrl-C")]
    Listen(ListenArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct PublishArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Service whose sync bus is used")]
    pub service: String,

    #[arg(short, long, help = "Cache key")]
    pub key: String,

    #[arg(short, long, help = "Value; parsed as JSON when --json is set")]
    pub value: String,

    #[arg(long, help = "TTL in seconds; 0 uses the default, negative never expires")]
    pub ttl_secs: Option<i64>,

    #[arg(long, help = "Interpret the value as JSON")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ListenArgs {
    #[arg(short, long, help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Service to run")]
    pub service: String,

    #[arg(long, default_value_t = 5, help = "Seconds between status lines")]
    pub interval_secs: u64,
}

mod check;
mod listen;
mod publish;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing(&cli.log);

    match &cli.command {
        Commands::Check(args) => check::execute(args).await,
        Commands::Publish(args) => publish::execute(args).await,
        Commands::Listen(args) => listen::execute(args).await,
    }
}
