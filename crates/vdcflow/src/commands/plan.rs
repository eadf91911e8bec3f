use colored::Colorize;
use std::path::Path;

pub async fn handle(path: &Path, teardown: bool) -> anyhow::Result<()> {
    let manifest = super::load_manifest(path).await;

    let (title, order) = if teardown {
        ("削除順序:", manifest.teardown_order())
    } else {
        ("構築順序:", manifest.provisioning_order())
    };

    println!();
    println!("{}", title.bold());
    for (step, resource) in order.iter().enumerate() {
        println!(
            "  {:>2}. {} {}",
            step + 1,
            resource.kind.to_string().yellow(),
            resource.name.cyan()
        );
    }

    Ok(())
}
