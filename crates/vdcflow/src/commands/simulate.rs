use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use vdcflow_cloud::InMemoryCloud;
use vdcflow_config::EngineConfig;
use vdcflow_engine::{LifecycleStatus, LocalRuntime, MemoryStateStore};

pub async fn handle(path: &Path, teardown: bool) -> anyhow::Result<()> {
    let manifest = super::load_manifest(path).await;
    let config = EngineConfig::discover()?;

    let cloud = Arc::new(InMemoryCloud::new());
    let runtime = LocalRuntime::new(
        cloud.connector(),
        Arc::new(MemoryStateStore::new()),
        &config,
    );
    runtime.load_manifest(&manifest).await?;

    println!();
    println!("{}", "インメモリクラウドに構築中...".blue());
    let started = Instant::now();
    if let Err(e) = runtime.install_all().await {
        eprintln!();
        eprintln!("{}", "✗ 構築に失敗しました".red().bold());
        eprintln!("  {}", e);
        print_instances(&runtime).await;
        std::process::exit(1);
    }
    println!(
        "{} ({} 回のAPI呼び出し, {:.1}秒)",
        "✓ 構築が完了しました".green().bold(),
        cloud.calls().len(),
        started.elapsed().as_secs_f64()
    );
    print_instances(&runtime).await;

    if teardown {
        println!();
        println!("{}", "削除中...".blue());
        cloud.clear_calls();
        runtime.uninstall_all().await?;
        println!(
            "{} ({} 回のAPI呼び出し)",
            "✓ 削除が完了しました".green().bold(),
            cloud.calls().len()
        );
    }

    Ok(())
}

async fn print_instances(runtime: &LocalRuntime) {
    println!();
    println!("リソース:");
    for instance in runtime.instances().await {
        let status = match instance.status {
            LifecycleStatus::Installed => instance.status.to_string().green(),
            LifecycleStatus::Uninstalled => instance.status.to_string().red(),
            _ => instance.status.to_string().yellow(),
        };
        println!(
            "  {:<20} {:<24} {}",
            instance.kind.to_string(),
            instance.name.cyan(),
            status
        );
    }
}
