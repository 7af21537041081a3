//! Best-effort workflow notifier.
//!
//! `notify` never returns an error: every stage yields an explicit result
//! and the composed [`NotifyOutcome`] is logged and handed back for
//! inspection only.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{WorkflowApi, WorkflowItem};
use crate::config::{DEFAULT_REFERENCE_FIELDS, WorkflowConfig};
use crate::error::WorkflowError;

/// Search/update knobs.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub page_size: u32,
    /// Hard ceiling on pages scanned per search.
    pub max_pages: u32,
    /// Candidate reference fields, probed in order.
    pub reference_fields: Vec<String>,
    pub comments_field: String,
    pub id_field: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 100,
            reference_fields: DEFAULT_REFERENCE_FIELDS.iter().map(|s| s.to_string()).collect(),
            comments_field: "KYC_Comments".into(),
            id_field: "_id".into(),
        }
    }
}

impl From<&WorkflowConfig> for NotifierSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            reference_fields: config.reference_fields.clone(),
            comments_field: config.comments_field.clone(),
            ..Self::default()
        }
    }
}

/// Why a notification was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoReference,
    NotFound,
}

/// Stage at which a notification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStage {
    Search,
    Fetch,
    Update,
}

impl fmt::Display for NotifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Fetch => "fetch",
            Self::Update => "update",
        })
    }
}

/// Final state of one notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Updated { item_id: String },
    Skipped(SkipReason),
    Failed { stage: NotifyStage, reason: String },
}

impl NotifyOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Result of the search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    NotFound,
}

pub struct WorkflowNotifier {
    api: Arc<dyn WorkflowApi>,
    settings: NotifierSettings,
}

impl WorkflowNotifier {
    pub fn new(api: Arc<dyn WorkflowApi>, settings: NotifierSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &NotifierSettings {
        &self.settings
    }

    /// Append `identifier` to the item whose reference field matches
    /// `reference`. Never fails; the outcome is logged and returned.
    pub async fn notify(&self, reference: Option<&str>, identifier: &str) -> NotifyOutcome {
        let outcome = self.run(reference, identifier).await;
        match &outcome {
            NotifyOutcome::Updated { item_id } => {
                tracing::info!(%item_id, %identifier, "Workflow item updated with identifier");
            }
            NotifyOutcome::Skipped(SkipReason::NoReference) => {
                tracing::debug!("No reference supplied; workflow update skipped");
            }
            NotifyOutcome::Skipped(SkipReason::NotFound) => {
                tracing::warn!(
                    reference = reference.unwrap_or_default(),
                    "No workflow item matches reference"
                );
            }
            NotifyOutcome::Failed { stage, reason } => {
                tracing::error!(%stage, %reason, "Workflow update failed");
            }
        }
        outcome
    }

    async fn run(&self, reference: Option<&str>, identifier: &str) -> NotifyOutcome {
        let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
            return NotifyOutcome::Skipped(SkipReason::NoReference);
        };

        let item_id = match self.find_item(reference).await {
            Ok(Lookup::Found(id)) => id,
            Ok(Lookup::NotFound) => return NotifyOutcome::Skipped(SkipReason::NotFound),
            Err(e) => {
                return NotifyOutcome::Failed {
                    stage: NotifyStage::Search,
                    reason: e.to_string(),
                };
            }
        };

        // Re-fetch right before writing so concurrent edits are not clobbered.
        let item = match self.api.get_item(&item_id).await {
            Ok(item) => item,
            Err(e) => {
                return NotifyOutcome::Failed {
                    stage: NotifyStage::Fetch,
                    reason: e.to_string(),
                };
            }
        };

        let fields = self.with_appended_comment(item, identifier);
        match self.api.update_item(&item_id, &fields).await {
            Ok(()) => NotifyOutcome::Updated { item_id },
            Err(e) => NotifyOutcome::Failed {
                stage: NotifyStage::Update,
                reason: e.to_string(),
            },
        }
    }

    /// Page through items looking for one whose reference field matches.
    pub async fn find_item(&self, reference: &str) -> Result<Lookup, WorkflowError> {
        for page in 1..=self.settings.max_pages {
            let items = self.api.list_items(page, self.settings.page_size).await?;
            tracing::debug!(page, count = items.len(), "Scanned workflow page");

            for (index, item) in items.iter().enumerate() {
                if self.matches_reference(item, reference) {
                    let id = item
                        .get(&self.settings.id_field)
                        .and_then(value_as_key)
                        .ok_or(WorkflowError::MissingItemId(index))?;
                    return Ok(Lookup::Found(id));
                }
            }

            if items.len() < self.settings.page_size as usize {
                return Ok(Lookup::NotFound);
            }
        }

        tracing::warn!(
            max_pages = self.settings.max_pages,
            "Workflow search stopped at page ceiling"
        );
        Ok(Lookup::NotFound)
    }

    fn matches_reference(&self, item: &WorkflowItem, reference: &str) -> bool {
        self.settings.reference_fields.iter().any(|field| {
            item.get(field)
                .and_then(value_as_key)
                .is_some_and(|value| value == reference)
        })
    }

    /// Append the identifier to the comments field and drop system fields.
    pub fn with_appended_comment(&self, mut item: WorkflowItem, identifier: &str) -> WorkflowItem {
        let field = &self.settings.comments_field;
        let existing = item
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let updated = if existing.trim().is_empty() {
            identifier.to_string()
        } else {
            format!("{existing}\n{identifier}")
        };
        item.insert(field.clone(), Value::String(updated));
        item.retain(|key, _| !key.starts_with('_'));
        item
    }
}

/// Render a scalar JSON value as a comparable key.
fn value_as_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    /// In-memory workflow backend with per-stage failure switches.
    #[derive(Default)]
    struct FakeApi {
        items: Vec<WorkflowItem>,
        fail_list: bool,
        fail_get: bool,
        fail_update: bool,
        pages_requested: Mutex<Vec<u32>>,
        updates: Mutex<Vec<(String, WorkflowItem)>>,
    }

    impl FakeApi {
        fn with_items(items: Vec<Value>) -> Self {
            Self {
                items: items
                    .into_iter()
                    .map(|v| v.as_object().cloned().unwrap())
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WorkflowApi for FakeApi {
        async fn list_items(
            &self,
            page_number: u32,
            page_size: u32,
        ) -> Result<Vec<WorkflowItem>, WorkflowError> {
            self.pages_requested.lock().unwrap().push(page_number);
            if self.fail_list {
                return Err(WorkflowError::Http("connection reset".into()));
            }
            let start = ((page_number - 1) * page_size) as usize;
            Ok(self
                .items
                .iter()
                .skip(start)
                .take(page_size as usize)
                .cloned()
                .collect())
        }

        async fn get_item(&self, item_id: &str) -> Result<WorkflowItem, WorkflowError> {
            if self.fail_get {
                return Err(WorkflowError::Status {
                    status: 404,
                    body: "gone".into(),
                });
            }
            self.items
                .iter()
                .find(|i| i.get("_id").and_then(Value::as_str) == Some(item_id))
                .cloned()
                .ok_or_else(|| WorkflowError::InvalidResponse("no such item".into()))
        }

        async fn update_item(
            &self,
            item_id: &str,
            fields: &WorkflowItem,
        ) -> Result<(), WorkflowError> {
            if self.fail_update {
                return Err(WorkflowError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.updates
                .lock()
                .unwrap()
                .push((item_id.to_string(), fields.clone()));
            Ok(())
        }
    }

    fn settings(page_size: u32, max_pages: u32) -> NotifierSettings {
        NotifierSettings {
            page_size,
            max_pages,
            ..Default::default()
        }
    }

    fn notifier(api: &Arc<FakeApi>, page_size: u32, max_pages: u32) -> WorkflowNotifier {
        WorkflowNotifier::new(
            Arc::clone(api) as Arc<dyn WorkflowApi>,
            settings(page_size, max_pages),
        )
    }

    fn filler(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"_id": format!("filler-{i}"), "Grant_ID": format!("OTHER-{i}")}))
            .collect()
    }

    // ── Skips ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn no_reference_skips_without_calls() {
        let api = Arc::new(FakeApi::default());
        let outcome = notifier(&api, 100, 100).notify(None, "legal:id").await;
        assert_eq!(outcome, NotifyOutcome::Skipped(SkipReason::NoReference));
        let blank = notifier(&api, 100, 100).notify(Some("  "), "legal:id").await;
        assert_eq!(blank, NotifyOutcome::Skipped(SkipReason::NoReference));
        assert!(api.pages_requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_found_stops_at_short_page() {
        let api = Arc::new(FakeApi::with_items(filler(5)));
        let outcome = notifier(&api, 2, 100).notify(Some("G-1"), "legal:id").await;
        assert_eq!(outcome, NotifyOutcome::Skipped(SkipReason::NotFound));
        assert_eq!(*api.pages_requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn search_respects_page_ceiling() {
        let api = Arc::new(FakeApi::with_items(filler(50)));
        let outcome = notifier(&api, 2, 3).notify(Some("G-1"), "legal:id").await;
        assert_eq!(outcome, NotifyOutcome::Skipped(SkipReason::NotFound));
        assert_eq!(*api.pages_requested.lock().unwrap(), vec![1, 2, 3]);
    }

    // ── Search ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn finds_item_on_later_page_and_appends() {
        let mut items = filler(3);
        items.push(json!({
            "_id": "item-7",
            "_created_by": "system",
            "Grant_ID": "G-1",
            "KYC_Comments": "earlier note",
            "Amount": 5000,
        }));
        let api = Arc::new(FakeApi::with_items(items));
        let outcome = notifier(&api, 2, 100)
            .notify(Some("G-1"), "legal:2025:01:15:14:30:45:1234")
            .await;

        assert_eq!(
            outcome,
            NotifyOutcome::Updated {
                item_id: "item-7".into()
            }
        );
        let updates = api.updates.lock().unwrap();
        let (id, fields) = &updates[0];
        assert_eq!(id, "item-7");
        assert_eq!(
            fields["KYC_Comments"],
            "earlier note\nlegal:2025:01:15:14:30:45:1234"
        );
        assert_eq!(fields["Amount"], 5000);
        assert!(fields.keys().all(|k| !k.starts_with('_')));
    }

    #[tokio::test]
    async fn any_candidate_field_can_match() {
        let api = Arc::new(FakeApi::with_items(vec![
            json!({"_id": "a", "Grant_ID": "G-1", "Title": "G-9"}),
            json!({"_id": "b", "Grant_ID": "G-2", "Request_Number": " G-9 "}),
            json!({"_id": "c", "GrantID": "G-9"}),
        ]));
        let lookup = notifier(&api, 100, 100).find_item("G-9").await.unwrap();
        assert_eq!(lookup, Lookup::Found("b".into()));
    }

    #[tokio::test]
    async fn numeric_reference_values_match() {
        let api = Arc::new(FakeApi::with_items(vec![json!({"_id": "n", "Grant_Number": 4711})]));
        let lookup = notifier(&api, 100, 100).find_item("4711").await.unwrap();
        assert_eq!(lookup, Lookup::Found("n".into()));
    }

    #[tokio::test]
    async fn match_without_id_is_a_search_failure() {
        let api = Arc::new(FakeApi::with_items(vec![json!({"Grant_ID": "G-1"})]));
        let outcome = notifier(&api, 100, 100).notify(Some("G-1"), "id").await;
        assert!(matches!(
            outcome,
            NotifyOutcome::Failed {
                stage: NotifyStage::Search,
                ..
            }
        ));
    }

    // ── Failures never escape ───────────────────────────────────────

    #[tokio::test]
    async fn search_error_is_reported() {
        let api = Arc::new(FakeApi {
            fail_list: true,
            ..Default::default()
        });
        let outcome = notifier(&api, 100, 100).notify(Some("G-1"), "id").await;
        assert!(matches!(
            outcome,
            NotifyOutcome::Failed {
                stage: NotifyStage::Search,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fetch_error_is_reported() {
        let mut api = FakeApi::with_items(vec![json!({"_id": "x", "Grant_ID": "G-1"})]);
        api.fail_get = true;
        let api = Arc::new(api);
        let outcome = notifier(&api, 100, 100).notify(Some("G-1"), "id").await;
        assert!(matches!(
            outcome,
            NotifyOutcome::Failed {
                stage: NotifyStage::Fetch,
                ..
            }
        ));
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_error_is_reported() {
        let mut api = FakeApi::with_items(vec![json!({"_id": "x", "Grant_ID": "G-1"})]);
        api.fail_update = true;
        let api = Arc::new(api);
        let outcome = notifier(&api, 100, 100).notify(Some("G-1"), "id").await;
        assert!(matches!(
            outcome,
            NotifyOutcome::Failed {
                stage: NotifyStage::Update,
                ..
            }
        ));
        assert!(!outcome.is_updated());
    }

    // ── Comment merging ─────────────────────────────────────────────

    #[test]
    fn empty_comments_get_identifier_only() {
        let n = WorkflowNotifier::new(Arc::new(FakeApi::default()), NotifierSettings::default());
        let item = json!({"_id": "x", "KYC_Comments": ""}).as_object().cloned().unwrap();
        let merged = n.with_appended_comment(item, "legal:id");
        assert_eq!(merged["KYC_Comments"], "legal:id");
        assert!(!merged.contains_key("_id"));
    }

    #[test]
    fn missing_comments_field_is_created() {
        let n = WorkflowNotifier::new(Arc::new(FakeApi::default()), NotifierSettings::default());
        let item = json!({"Title": "t"}).as_object().cloned().unwrap();
        let merged = n.with_appended_comment(item, "legal:id");
        assert_eq!(merged["KYC_Comments"], "legal:id");
        assert_eq!(merged["Title"], "t");
    }
}
