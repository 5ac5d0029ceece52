use std::collections::HashMap;

/// Looks up display handles for participants. Purely cosmetic: scoring never consults it.
pub trait UserDirectory: Send + Sync {
    fn resolve_handle(&self, user_id: &str) -> Option<String>;
}

/// Directory backed by a fixed map, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    handles: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new(handles: HashMap<String, String>) -> Self {
        StaticDirectory { handles }
    }

    pub fn insert(&mut self, user_id: impl Into<String>, handle: impl Into<String>) {
        self.handles.insert(user_id.into(), handle.into());
    }
}

impl UserDirectory for StaticDirectory {
    fn resolve_handle(&self, user_id: &str) -> Option<String> {
        self.handles.get(user_id).cloned()
    }
}
