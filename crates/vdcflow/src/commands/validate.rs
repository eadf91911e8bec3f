use colored::Colorize;
use std::path::Path;
use vdcflow_engine::ResourceKind;

pub async fn handle(path: &Path) -> anyhow::Result<()> {
    println!("{}", "マニフェストを検証中...".blue());
    let manifest = super::load_manifest(path).await;

    println!("{}", "✓ マニフェストは正常です！".green().bold());
    println!();
    println!("サマリー:");
    for kind in ResourceKind::ALL {
        let resources: Vec<_> = manifest
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .collect();
        if resources.is_empty() {
            continue;
        }
        println!("  {}: {}個", kind, resources.len());
        for resource in resources {
            let references = resource
                .references()
                .iter()
                .map(|r| format!("{} → {}", r.field, r.name))
                .collect::<Vec<_>>();
            if references.is_empty() {
                println!("    - {}", resource.name.cyan());
            } else {
                println!(
                    "    - {} ({})",
                    resource.name.cyan(),
                    references.join(", ")
                );
            }
        }
    }

    Ok(())
}
