use anyhow::{Context, Result};
use dialoguer::Select;
use owo_colors::OwoColorize;
use urus_core::Session;
use urus_core::migration::{discard_guest_data, keep_guest_data};

use crate::render::Render;
use crate::utils::tui;

pub async fn login(session: &Session, email: &str) -> Result<()> {
    let password =
        rpassword::prompt_password(format!("Password for {email}: ")).context("Failed to read password")?;

    let spinner = tui::create_spinner(format!("Signing in as {email}"));
    let result = session.login(email, &password).await;
    spinner.finish_and_clear();

    let status = result?;
    println!("{}", status.render());

    if let Some(stats) = status.pending_migration.clone() {
        println!("\nThis device has data created before you signed in:");
        println!("{}", stats.render());
        println!();

        let choice = Select::new()
            .with_prompt("What should happen to it?")
            .items(&["Keep it in this account", "Discard it and use only cloud data"])
            .default(0)
            .interact()?;

        let (message, result) = if choice == 0 {
            let spinner = tui::create_spinner("Moving guest data into your account");
            let result = keep_guest_data(session.storage(), session.auth()).await;
            spinner.finish_and_clear();
            (format!("Kept {} guest records", stats.total()), result)
        } else {
            let spinner = tui::create_spinner("Discarding guest data");
            let result = discard_guest_data(session.storage(), session.auth()).await;
            spinner.finish_and_clear();
            ("Guest data discarded".to_string(), result)
        };

        match result {
            Ok(()) => println!("{message}"),
            Err(e) => {
                println!("{}", format!("Failed: {e}").red());
                println!("Nothing was decided; run `urus login` again to retry.");
            }
        }
    }

    Ok(())
}

pub async fn logout(session: &Session) -> Result<()> {
    if session.current_user().is_none() {
        println!("{}", "Not signed in".dimmed());
        return Ok(());
    }

    let status = session.logout().await?;
    println!("Signed out. Now {}", status.render());
    Ok(())
}
