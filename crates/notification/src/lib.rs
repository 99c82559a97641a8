//! Operator Notification
//!
//! Turns surfaced dispatch outcomes into short spoken-style announcements
//! and hands them to a speech or display consumer without ever blocking
//! the caller.

mod announcer;

pub use announcer::{run_announcer, Announcement, ChannelNotifier, Language, NotifierConfig};

use dispatch::Outcome;
use plate_tracker::Panel;

/// Sink for outcomes surfaced to the operator.
///
/// Implementations must return quickly; they are called from dispatch
/// completion tasks and from camera workers.
pub trait Notifier: Send + Sync {
    fn notify(&self, plate: &str, panel: Panel, outcome: &Outcome);
}

/// Notifier that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _plate: &str, _panel: Panel, _outcome: &Outcome) {}
}
