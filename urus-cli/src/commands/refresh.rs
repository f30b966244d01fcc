use anyhow::Result;
use owo_colors::OwoColorize;
use urus_core::Session;

use crate::utils::tui;

pub async fn run(session: &Session) -> Result<()> {
    let spinner = tui::create_spinner("Refreshing".to_string());
    let result = session.refresh().await;
    spinner.finish_and_clear();

    match result? {
        Some(report) if report.synced + report.remaining > 0 => {
            println!("Offline changes: {} synced", report.synced);
            if report.remaining > 0 {
                println!("   {}", format!("{} still queued", report.remaining).yellow());
            }
        }
        Some(_) => {}
        None => println!("{}", "Guest mode, nothing to push".dimmed()),
    }

    let counts = session.storage().counts();
    let total: usize = counts.0.values().sum();
    println!("Loaded {} records", total);
    Ok(())
}
