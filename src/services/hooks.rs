//! Named callbacks fired once a task reaches a terminal status (§4.3's
//! completion/error hooks). Delivery is at-least-once: a hook that errors is
//! logged and the remaining hooks still run, so one broken handler can't wedge
//! the engine's terminal write path. Handlers are expected to be idempotent,
//! since a reconciliation pass (`services::scheduler`) may invoke the same
//! outcome twice after a process restart.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::task::TaskStatus;

/// Fired for every task that reaches a terminal status, regardless of which one.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_completion(&self, task_id: Uuid, final_status: TaskStatus) -> Result<(), String>;
}

/// Fired in addition to `CompletionHook` when the terminal status is `failed`.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn on_error(&self, task_id: Uuid, final_status: TaskStatus, error: &str) -> Result<(), String>;
}

/// Registry of completion/error hooks. Hooks are never removed once
/// registered; the set is expected to be built once at startup (engine-wide
/// plug-ins), not per task.
#[derive(Default)]
pub struct HookRegistry {
    completion_hooks: RwLock<Vec<Arc<dyn CompletionHook>>>,
    error_hooks: RwLock<Vec<Arc<dyn ErrorHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_completion(&self, hook: Arc<dyn CompletionHook>) {
        self.completion_hooks.write().await.push(hook);
    }

    pub async fn register_error(&self, hook: Arc<dyn ErrorHook>) {
        self.error_hooks.write().await.push(hook);
    }

    #[tracing::instrument(skip(self), fields(task_id = %task_id, final_status = final_status.as_str()))]
    pub async fn fire_completion(&self, task_id: Uuid, final_status: TaskStatus) {
        for hook in self.completion_hooks.read().await.iter() {
            if let Err(error) = hook.on_completion(task_id, final_status).await {
                tracing::warn!(%task_id, %error, "completion hook failed, continuing with remaining hooks");
            }
        }
    }

    #[tracing::instrument(skip(self, error), fields(task_id = %task_id))]
    pub async fn fire_error(&self, task_id: Uuid, final_status: TaskStatus, error: &str) {
        for hook in self.error_hooks.read().await.iter() {
            if let Err(hook_error) = hook.on_error(task_id, final_status, error).await {
                tracing::warn!(%task_id, %hook_error, "error hook failed, continuing with remaining hooks");
            }
        }
    }
}
