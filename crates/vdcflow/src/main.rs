mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_MANIFEST: &str = "vdcflow.manifest.yaml";

#[derive(Parser)]
#[command(name = "vdcflow")]
#[command(about = "宣言したとおりに、クラウドが揃う。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// マニフェストを検証
    Validate {
        /// マニフェストファイルのパス
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// 構築（または削除）の実行順序を表示
    Plan {
        /// マニフェストファイルのパス
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
        /// 削除順序を表示する
        #[arg(short, long)]
        teardown: bool,
    },
    /// インメモリのクラウドに対して構築をシミュレート
    Simulate {
        /// マニフェストファイルのパス
        #[arg(default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
        /// 構築後にすべて削除する
        #[arg(short, long)]
        teardown: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrへ（RUST_LOG で詳細度を指定）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Validate { manifest } => commands::validate::handle(&manifest).await?,
        Commands::Plan { manifest, teardown } => {
            commands::plan::handle(&manifest, teardown).await?
        }
        Commands::Simulate { manifest, teardown } => {
            commands::simulate::handle(&manifest, teardown).await?
        }
        Commands::Version => {
            println!("vdcflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
