use std::path::{Path, PathBuf};

use anyhow::Result;
use urus_core::Session;
use urus_core::backup::{default_file_name, export_to_file, import_file};
use urus_core::time::today;

pub async fn export(session: &Session, path: Option<PathBuf>) -> Result<()> {
    session.auth().wait_for_auth_sync().await;

    let path = path.unwrap_or_else(|| PathBuf::from(default_file_name(today())));
    let document = export_to_file(session.storage(), &path).await?;
    println!(
        "Exported {} records to {}",
        document.record_count(),
        path.display()
    );
    Ok(())
}

pub async fn import(session: &Session, path: &Path) -> Result<()> {
    session.auth().wait_for_auth_sync().await;

    let restored = import_file(session.storage(), path).await?;
    println!("Restored {} records from {}", restored, path.display());
    Ok(())
}
