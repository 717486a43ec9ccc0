//! Live session tracking: the append-aware tail watcher, the topic-keyed
//! event bus, live-process detection, the waiting-for-input detector, and
//! the push notification dispatch gate.

pub mod event_bus;
pub mod needs_input;
pub mod process_detector;
pub mod push;
pub mod tail_watcher;

pub use event_bus::{Event, EventBus, Subscription, GLOBAL_TOPIC};
pub use needs_input::{NeedsInputDetector, WaitingSetHandle};
pub use process_detector::{detect_live_sessions, ProcessDetectorConfig};
pub use push::{PushSender, RateLimitedPush};
pub use tail_watcher::TailWatcher;
