use montage_core::models::{Task, TaskOutcome, TaskType};
use tracing::debug;

use crate::dispatcher::Dispatcher;
use crate::poller::Poller;
use crate::services::GenerationServices;

/// Routes generation tasks to the dispatcher or the poller.
#[derive(Clone)]
pub struct GenerationHandlers {
    dispatcher: Dispatcher,
    poller: Poller,
}

impl GenerationHandlers {
    pub fn new(services: GenerationServices) -> Self {
        Self {
            dispatcher: Dispatcher::new(services.clone()),
            poller: Poller::new(services),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub async fn handle(&self, task: &Task) -> TaskOutcome {
        debug!(task_id = %task.id, task_type = %task.task_type, "Handling generation task");
        match task.task_type {
            TaskType::StartGeneration => self.dispatcher.handle_task(task).await,
            TaskType::CheckGenerationStatus => self.poller.handle_task(task).await,
        }
    }
}
