use anyhow::Result;
use owo_colors::OwoColorize;
use urus_core::Session;
use urus_core::calendar::SyncMapping;
use urus_core::model::Table;

use crate::render::Render;

pub async fn run(session: &Session) -> Result<()> {
    let status = session.auth().wait_for_auth_sync().await;
    let storage = session.storage();

    println!("{}", status.render());
    println!("   data: {}", session.config().data_path().display().dimmed());

    let counts = storage.counts();
    println!();
    for table in Table::ALL {
        println!("   {:<12} {}", table.name(), counts.get(table));
    }

    let queued = session.pending_writes();
    if queued > 0 {
        println!("\n   {} offline {} waiting to sync", queued, pluralize(queued));
    }

    let mapping = SyncMapping::load(storage.local())?;
    if let Some(calendar) = mapping.selected_calendar {
        println!(
            "\n📅 {} ({} events synced {})",
            calendar.name,
            mapping.entries.len(),
            mapping
                .last_sync_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "never".into())
        );
    }

    Ok(())
}

fn pluralize(count: usize) -> &'static str {
    if count == 1 { "change" } else { "changes" }
}
