use anyhow::{Result, bail};
use owo_colors::OwoColorize;
use urus_core::Session;
use urus_core::calendar::{CalendarBackend, CalendarSync, ProviderBackend};

use crate::CalendarAction;
use crate::render::Render;
use crate::utils::tui;

pub async fn run(session: &Session, action: CalendarAction) -> Result<()> {
    let Some(provider) = session.config().calendar.provider.as_deref() else {
        bail!(
            "No calendar provider configured.\n\n\
            Set one in the [calendar] section of the config:\n  \
            provider = \"<name>\"   # runs urus-calendar-<name>"
        );
    };
    let backend = ProviderBackend::from_name(provider);

    // Calendar sync reads the cache, so hydration has to be done first.
    session.auth().wait_for_auth_sync().await;
    let sync = CalendarSync::new(session.storage(), &backend);

    match action {
        CalendarAction::Sync => {
            ensure_permission(&backend).await?;
            let spinner = tui::create_spinner("Syncing today's schedule".to_string());
            let result = sync.smart_sync().await;
            spinner.finish_and_clear();
            println!("{}", result?.render());
        }
        CalendarAction::Clear => {
            ensure_permission(&backend).await?;
            let spinner = tui::create_spinner("Removing today's events".to_string());
            let result = sync.clear_today_calendar_events().await;
            spinner.finish_and_clear();
            println!("{}", result?.render());
        }
        CalendarAction::List => {
            ensure_permission(&backend).await?;
            let selected = sync.selected_calendar()?.map(|c| c.id);
            for calendar in sync.list_calendars().await? {
                let marker = if selected.as_deref() == Some(calendar.id.as_str()) {
                    "*".green().to_string()
                } else {
                    " ".to_string()
                };
                println!("{} {}", marker, calendar.render());
            }
        }
        CalendarAction::Select { id } => {
            ensure_permission(&backend).await?;
            let selected = sync.select_calendar(&id).await?;
            println!("Syncing into 📅 {}", selected.name);
        }
    }

    Ok(())
}

async fn ensure_permission(backend: &ProviderBackend) -> Result<()> {
    if backend.check_permission().await? {
        return Ok(());
    }

    println!("Requesting calendar access...");
    if !backend.request_permission().await? {
        bail!("Calendar access was denied");
    }
    Ok(())
}
