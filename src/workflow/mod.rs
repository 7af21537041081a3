//! Workflow integration: posts correlation identifiers back into an
//! external tracking system (Kissflow) for legal/grant submissions.

pub mod kissflow;
pub mod notifier;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::WorkflowError;

pub use kissflow::KissflowClient;
pub use notifier::{NotifierSettings, NotifyOutcome, NotifyStage, SkipReason, WorkflowNotifier};

/// An item as returned by the workflow API.
pub type WorkflowItem = Map<String, Value>;

/// Minimal surface the notifier needs from a workflow backend.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    /// List one page of items. Pages are numbered from 1.
    async fn list_items(
        &self,
        page_number: u32,
        page_size: u32,
    ) -> Result<Vec<WorkflowItem>, WorkflowError>;

    /// Fetch a single item by id.
    async fn get_item(&self, item_id: &str) -> Result<WorkflowItem, WorkflowError>;

    /// Replace an item's writable fields.
    async fn update_item(&self, item_id: &str, fields: &WorkflowItem) -> Result<(), WorkflowError>;
}
