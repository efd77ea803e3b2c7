use tdee_core::sync::Notifier;

/// Prints sync notices to stderr so `--json` output on stdout stays clean.
pub struct StderrNotifier {
    pub quiet: bool,
}

impl Notifier for StderrNotifier {
    fn notify_success(&self, message: &str) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }

    fn notify_error(&self, message: &str) {
        eprintln!("Warning: {message}");
    }
}
