use serde::{Deserialize, Serialize};

/// Per-item request overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOptions {
    /// Conditional-match predicate: the store applies the operation only if
    /// the item's current etag equals this value.
    #[serde(default)]
    pub if_match_etag: Option<String>,
    /// When `false`, asks the store to omit the item body from the response,
    /// trading response size for a follow-up read if the body is needed.
    #[serde(default = "default_content_response")]
    pub content_response_enabled: bool,
}

fn default_content_response() -> bool {
    true
}

impl Default for ItemOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemOptions {
    pub fn new() -> Self {
        Self {
            if_match_etag: None,
            content_response_enabled: true,
        }
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match_etag = Some(etag.into());
        self
    }

    pub fn content_response(mut self, enabled: bool) -> Self {
        self.content_response_enabled = enabled;
        self
    }
}
