//! User-facing error notification.

/// Message shown to the user when the server cannot be reached.
pub const CONNECT_FAILURE_MESSAGE: &str = "Failed to connect to server";

/// Surface that shows errors to the user (snackbar, toast, stderr...).
pub trait ErrorDisplay: Send + Sync {
    fn display_error(&self, message: &str);
}

impl<F> ErrorDisplay for F
where
    F: Fn(&str) + Send + Sync,
{
    fn display_error(&self, message: &str) {
        self(message)
    }
}

/// Fallback display that only logs. Used when no UI surface is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorDisplay;

impl ErrorDisplay for TracingErrorDisplay {
    fn display_error(&self, message: &str) {
        tracing::error!(target: "sightline_client::notify", "{}", message);
    }
}
