//! UI automation capability
//!
//! The watcher does not walk a real accessibility tree. It asks a
//! [`UiAutomation`] implementation to find controls in the active window and
//! to activate them; hosts bridge this to their accessibility service and
//! tests substitute a fake.

use serde::{Deserialize, Serialize};

/// Kind of window notification delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowEventType {
    /// A new window or surface came to the foreground
    WindowStateChanged,
    /// Content inside the current window changed
    WindowContentChanged,
    /// Any other host event type
    Other(i32),
}

/// Window notification from the host automation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStateEvent {
    pub event_type: WindowEventType,
    /// Package owning the foregrounded surface
    pub package_name: Option<String>,
    pub class_name: Option<String>,
}

impl WindowStateEvent {
    /// A window-state change for `package`
    pub fn window_state(package: impl Into<String>) -> Self {
        Self {
            event_type: WindowEventType::WindowStateChanged,
            package_name: Some(package.into()),
            class_name: None,
        }
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }
}

/// Control found in the active window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiNode {
    /// Host-assigned identity of the node within its window
    pub node_id: u64,
    pub view_id: String,
    pub clickable: bool,
}

impl UiNode {
    pub fn new(node_id: u64, view_id: impl Into<String>, clickable: bool) -> Self {
        Self {
            node_id,
            view_id: view_id.into(),
            clickable,
        }
    }
}

/// Locate and activate controls in the host's active window
#[cfg_attr(test, mockall::automock)]
pub trait UiAutomation: Send + Sync {
    /// Nodes of the active window with this view id; empty when there is no
    /// active window or nothing matches
    fn find_by_view_id(&self, view_id: &str) -> Vec<UiNode>;

    /// Perform the click action on `node`; `false` when the host refused
    fn click(&self, node: &UiNode) -> bool;
}
