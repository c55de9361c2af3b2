use async_trait::async_trait;
use db::models::task::Task;
use engine::{error::EngineError, ports::Notifier};

/// Default out-of-band notifier: logs via `tracing`, matching the teacher's
/// pattern of treating notification transports as structured log lines when
/// no external sink (Telegram, webhook) is configured. A richer transport
/// can be layered in later by swapping the `Arc<dyn Notifier>` the
/// composition root wires, without touching the engine.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, task: &Task, message: &str) -> Result<(), EngineError> {
        tracing::info!(task_id = %task.id, "{message}");
        Ok(())
    }
}
