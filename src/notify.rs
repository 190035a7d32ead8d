// User-facing notifications for terminal request failures

/// Shown when the resource server answers 500
pub const SERVER_ERROR_MESSAGE: &str = "Server error, please try again later";

/// Shown on HTTP 504 or a transport timeout
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Shown when the session cannot be recovered without signing in again
pub const SESSION_INVALID_MESSAGE: &str = "Session is no longer valid, please sign in again";

/// Sink for human-readable failure messages
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Default sink: forwards messages to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        tracing::error!(notification = message, "{}", message);
    }
}
