//! Prepared query contracts exposed to the HTTP surface.
//!
//! Each submodule owns one family of reads: session listing/detail, the
//! conversation page, full-text search, and the token/tool rollups. All
//! queries are plain `sqlx` bind-parameter calls — no string interpolation.

mod analytics;
mod push;
mod search;
mod sessions;

pub use analytics::{Period, ToolHistogramEntry, TokenRollupEntry};
pub use push::{DeviceSubscription, WebPushSubscription};
pub use search::SearchHit;
pub use sessions::{
    ConversationPage, FileTouchCount, MessageRow, SessionDetail, SessionFilter, SessionListPage,
    SessionRow, ToolCount,
};
