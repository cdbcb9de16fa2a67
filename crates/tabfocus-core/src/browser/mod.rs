use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::MemoryBrowser;

/// Browser-assigned tab identifier. Only valid while the tab is open.
pub type TabId = i64;

/// An open tab as reported by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// A pre-navigation event: `tab_id` is about to load `url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub tab_id: TabId,
    pub url: String,
}

/// Toolbar badge contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: Option<String>,
}

/// A user-facing notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Tab operations the engines need from the browser
#[async_trait]
pub trait TabHost: Send + Sync {
    /// All open tabs across all windows
    async fn query_tabs(&self) -> Result<Vec<TabInfo>>;

    /// Close a tab
    async fn remove_tab(&self, id: TabId) -> Result<()>;

    /// Open a new tab at `url`
    async fn create_tab(&self, url: &str, active: bool) -> Result<TabId>;

    /// Point an existing tab at `url`
    async fn update_tab_url(&self, id: TabId, url: &str) -> Result<()>;

    /// The focused tab of the focused window, if any
    async fn active_tab(&self) -> Result<Option<TabInfo>>;
}

/// Icon badge and notification surface
#[async_trait]
pub trait StatusPort: Send + Sync {
    async fn set_badge(&self, badge: &Badge) -> Result<()>;

    async fn notify(&self, notification: &Notification) -> Result<()>;
}
