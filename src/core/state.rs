use std::sync::Arc;

use crate::core::config::Settings;
use crate::store::GradingStore;

/// Process-scoped handles, built once at startup and passed down explicitly.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn GradingStore>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: Arc<dyn GradingStore>) -> Self {
        Self { inner: Arc::new(InnerState { settings, store }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn GradingStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn GradingStore> {
        Arc::clone(&self.inner.store)
    }
}
