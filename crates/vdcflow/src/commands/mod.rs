pub mod plan;
pub mod simulate;
pub mod validate;

use colored::Colorize;
use std::path::Path;
use vdcflow_engine::Manifest;

/// マニフェストを読み込んで検証する。失敗時はエラーを表示して終了
pub(crate) async fn load_manifest(path: &Path) -> Manifest {
    println!("マニフェスト: {}", path.display().to_string().cyan());

    let manifest = match Manifest::load(path).await {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ マニフェストを読み込めません".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = manifest.validate() {
        eprintln!();
        eprintln!("{}", "✗ マニフェストエラー".red().bold());
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    manifest
}
