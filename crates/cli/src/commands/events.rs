use chrono::{DateTime, Utc};
use clap::Subcommand;
use db::models::task_event::TaskEvent;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::exit::CliOutcome;

#[derive(Subcommand)]
pub enum EventsCommand {
    /// Keyset-paged task events, oldest first
    List {
        task_id: Uuid,
        /// Only events created strictly after this RFC3339 timestamp
        #[arg(long)]
        after: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

pub async fn run(command: EventsCommand, pool: &SqlitePool) -> CliOutcome {
    match command {
        EventsCommand::List { task_id, after, limit } => match TaskEvent::find_page(pool, task_id, after, limit).await {
            Ok(events) => {
                crate::print_json(&events);
                CliOutcome::Success
            }
            Err(e) => CliOutcome::DatabaseError(e.to_string()),
        },
    }
}
