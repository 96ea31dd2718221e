mod rest_reminder;
mod startup_notifier;

pub use rest_reminder::RestReminderBot;
pub use startup_notifier::StartupNotifierBot;
