/*
[INPUT]:  Pending-task counts and background transitions from the manager
[OUTPUT]: Badge counts and user-visible notifications
[POS]:    Presentation seam - platform notification surface
[UPDATE]: When adding a real platform notification backend
*/

/// Surface for badge counts and background notifications.
///
/// The engine only decides WHEN to notify; rendering is platform work behind
/// this trait.
pub trait Notifier: Send + Sync {
    fn set_badge_count(&self, count: u32);
    fn show_notification(&self, message: &str);
    fn clear_notification(&self);
}

/// Default notifier that only logs. Headless runs and tests use this.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn set_badge_count(&self, count: u32) {
        tracing::info!(count, "badge count");
    }

    fn show_notification(&self, message: &str) {
        tracing::info!(message, "notification");
    }

    fn clear_notification(&self) {
        tracing::debug!("notifications cleared");
    }
}
