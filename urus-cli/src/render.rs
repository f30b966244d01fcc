//! Colored terminal rendering for urus types.

use owo_colors::OwoColorize;
use urus_core::calendar::{ClearResult, NativeCalendar, SyncResult};
use urus_core::model::{PriorityTask, RoutineItem};
use urus_core::{AuthSyncState, AuthSyncStatus, MigrationStats};

pub trait Render {
    fn render(&self) -> String;
}

impl Render for AuthSyncState {
    fn render(&self) -> String {
        match self {
            AuthSyncState::Idle => "idle".dimmed().to_string(),
            AuthSyncState::Syncing => "syncing".yellow().to_string(),
            AuthSyncState::Ready => "ready".green().to_string(),
            AuthSyncState::Error => "error".red().to_string(),
        }
    }
}

impl Render for AuthSyncStatus {
    fn render(&self) -> String {
        let who = match &self.user {
            Some(user) => user.label().bold().to_string(),
            None => "guest".dimmed().to_string(),
        };
        let mode = if self.is_cloud_mode { "cloud" } else { "local" };

        let mut line = format!("{} ({} mode, {})", who, mode, self.state.render());
        if let Some(error) = &self.error {
            line.push_str(&format!("\n   {}", error.to_string().red()));
        }
        if let Some(stats) = &self.pending_migration {
            line.push_str(&format!(
                "\n   {}",
                format!(
                    "{} guest records await a decision; run `urus login` to choose",
                    stats.total()
                )
                .yellow()
            ));
        }
        line
    }
}

impl Render for RoutineItem {
    fn render(&self) -> String {
        let check = if self.completed_at.is_some() {
            "✓".green().to_string()
        } else {
            " ".to_string()
        };
        format!(
            "[{}] {}-{} {} {} {}",
            check,
            self.start_time,
            self.end_time,
            self.activity,
            format!("({})", self.category).dimmed(),
            self.id.dimmed()
        )
    }
}

impl Render for PriorityTask {
    fn render(&self) -> String {
        let check = if self.completed {
            "✓".green().to_string()
        } else {
            " ".to_string()
        };
        let when = match self.scheduled_for {
            Some(day) => day.to_string(),
            None => "daily".to_string(),
        };
        format!(
            "[{}] {} {} {}",
            check,
            self.text,
            format!("({})", when).dimmed(),
            self.id.dimmed()
        )
    }
}

impl Render for MigrationStats {
    fn render(&self) -> String {
        [
            ("priorities", self.priorities),
            ("routines", self.routines),
            ("notes", self.notes),
            ("habits", self.habits),
            ("reflections", self.reflections),
            ("logs", self.logs),
        ]
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(label, n)| format!("   {} {}", n, label))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

impl Render for NativeCalendar {
    fn render(&self) -> String {
        let access = if self.writable { "" } else { " (read-only)" };
        format!("📅 {}{} {}", self.title, access.dimmed(), self.id.dimmed())
    }
}

impl Render for SyncResult {
    fn render(&self) -> String {
        let mut lines = Vec::new();
        if self.created + self.updated + self.deleted == 0 && self.success {
            lines.push("Calendar is up to date".dimmed().to_string());
        } else {
            lines.push(format!(
                "Synced: {} created, {} updated, {} deleted",
                self.created.green(),
                self.updated.yellow(),
                self.deleted.red()
            ));
        }
        lines.extend(render_errors(&self.errors));
        lines.join("\n")
    }
}

impl Render for ClearResult {
    fn render(&self) -> String {
        let mut lines = vec![format!("Removed {} {}", self.deleted, pluralize("event", self.deleted))];
        lines.extend(render_errors(&self.errors));
        lines.join("\n")
    }
}

fn render_errors(errors: &[String]) -> impl Iterator<Item = String> + '_ {
    errors.iter().map(|e| format!("   {}", e.red()))
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
