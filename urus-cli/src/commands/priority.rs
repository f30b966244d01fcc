use anyhow::{Context, Result};
use chrono::NaiveDate;
use owo_colors::OwoColorize;
use urus_core::Session;
use urus_core::model::PriorityTask;
use urus_core::time::today;

use crate::PriorityAction;
use crate::render::Render;

pub async fn run(session: &Session, action: PriorityAction) -> Result<()> {
    session.auth().wait_for_auth_sync().await;
    let storage = session.storage();

    match action {
        PriorityAction::List => {
            let day = today();
            let priorities: Vec<_> = storage
                .list::<PriorityTask>()
                .into_iter()
                .filter(|p| p.is_for(day))
                .collect();
            if priorities.is_empty() {
                println!("{}", "No priorities for today".dimmed());
            }
            for priority in &priorities {
                println!("{}", priority.render());
            }
        }
        PriorityAction::Add { text, on } => {
            let scheduled_for = on
                .map(|s| {
                    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
                })
                .transpose()?;
            let priority = storage.add_priority(&text, scheduled_for).await?;
            println!("{} {}", "+".green(), priority.render());
        }
        PriorityAction::Done { id, note } => {
            let priority = storage.toggle_priority(&id, note).await?;
            println!("{}", priority.render());
        }
        PriorityAction::Remove { id } => {
            storage.delete::<PriorityTask>(&id).await?;
            println!("{} {}", "-".red(), id);
        }
    }

    Ok(())
}
