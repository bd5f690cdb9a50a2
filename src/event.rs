use crate::window::{TabId, WindowId};

/// Internal events delivered to the server's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// The process behind a tab exited (or its PTY reached EOF).
    TabExited { window: WindowId, tab: TabId },
}
