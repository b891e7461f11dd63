//! Observing the progress of a scan

/// A collaborator notified while the card is being read.
/// Notifications are purely informational; the scan never waits for them.
pub trait Feedback {
    fn update_status_text(&self, text: &str);

    fn update_progress_bar(&self, progress: u32, max: u32);
}

/// Feedback that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn update_status_text(&self, _text: &str) {}

    fn update_progress_bar(&self, _progress: u32, _max: u32) {}
}

impl<T> Feedback for &T
where
    T: Feedback + ?Sized,
{
    fn update_status_text(&self, text: &str) {
        (**self).update_status_text(text)
    }

    fn update_progress_bar(&self, progress: u32, max: u32) {
        (**self).update_progress_bar(progress, max)
    }
}
