use anyhow::Result;
use owo_colors::OwoColorize;
use urus_core::Session;
use urus_core::model::RoutineItem;

use crate::RoutineAction;
use crate::render::Render;

pub async fn run(session: &Session, action: RoutineAction) -> Result<()> {
    session.auth().wait_for_auth_sync().await;
    let storage = session.storage();

    match action {
        RoutineAction::List => {
            let mut routines = storage.list::<RoutineItem>();
            if routines.is_empty() {
                println!("{}", "No routines".dimmed());
            }
            routines.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            for routine in &routines {
                println!("{}", routine.render());
            }
        }
        RoutineAction::Add {
            start,
            end,
            activity,
            category,
            description,
        } => {
            let routine = storage
                .add_routine(&start, &end, &activity, &category, description)
                .await?;
            println!("{} {}", "+".green(), routine.render());
        }
        RoutineAction::Done { id, note } => {
            let routine = storage.toggle_routine(&id, note).await?;
            println!("{}", routine.render());
        }
        RoutineAction::Remove { id } => {
            storage.delete::<RoutineItem>(&id).await?;
            println!("{} {}", "-".red(), id);
        }
    }

    Ok(())
}
