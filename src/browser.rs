//! Browser-State & Content-Script Bridge (spec.md §4.5): a stable,
//! alias-addressed view over browser tabs, and reliable delivery of typed
//! commands to page-embedded scripts across navigation, injection
//! failure, and restricted URLs.

mod bridge;
mod chromium;
mod history;
mod session_store;
mod tab;
pub mod wire;

pub use bridge::{is_restricted_url, Bridge, NavigationOutcome, NavigationStatus, PageHandle, SendResult};
pub use chromium::ChromiumPage;
pub use history::{History, HistoryEntry};
pub use session_store::SessionStore;
pub use tab::{Tab, TabContent, TabRegistry, TabRegistrySnapshot};
