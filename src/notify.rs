use std::io::Write;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    High,
}

/// Fire-and-forget user alerts.
pub trait Notifier {
    fn show(&self, title: &str, body: &str, urgency: Urgency);
}

/// Prints alerts to stderr; high-urgency ones ring the terminal bell.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show(&self, title: &str, body: &str, urgency: Urgency) {
        info!(title, body, ?urgency, "notification");
        let mut err = std::io::stderr().lock();
        let bell = if urgency == Urgency::High { "\x07" } else { "" };
        let _ = writeln!(err, "{}[{}] {}", bell, title, body);
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: std::cell::RefCell<Vec<(String, String, Urgency)>>,
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn show(&self, title: &str, body: &str, urgency: Urgency) {
        self.shown
            .borrow_mut()
            .push((title.to_string(), body.to_string(), urgency));
    }
}
