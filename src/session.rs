use std::sync::Arc;

use crate::storage::{keys, read_json, read_string_list, write_json, Storage};

/// The reader's category selection and onboarding state.
#[derive(Clone)]
pub struct Session {
    storage: Arc<dyn Storage>,
}

impl Session {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist the selection and mark onboarding as done.
    pub async fn save_selected_categories(&self, category_ids: &[String]) {
        write_json(self.storage.as_ref(), keys::SELECTED_CATEGORIES, category_ids).await;
        write_json(self.storage.as_ref(), keys::ENTERED_HOME, &true).await;
    }

    pub async fn selected_categories(&self) -> Vec<String> {
        read_string_list(self.storage.as_ref(), keys::SELECTED_CATEGORIES).await
    }

    pub async fn has_entered_home(&self) -> bool {
        let entered = read_json::<bool>(self.storage.as_ref(), keys::ENTERED_HOME)
            .await
            .unwrap_or(false);
        entered && !self.selected_categories().await.is_empty()
    }
}
