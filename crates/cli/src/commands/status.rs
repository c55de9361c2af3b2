use crate::exit::{self, CliOutcome};
use workflow::AppServices;

pub async fn run(services: &AppServices) -> CliOutcome {
    match services.workflow.get_dashboard_stats().await {
        Ok(stats) => {
            crate::print_json(&stats);
            CliOutcome::Success
        }
        Err(e) => exit::from_workflow_error(e),
    }
}
