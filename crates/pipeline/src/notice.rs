//! User-facing notices and post-expiry navigation

use std::time::Duration;

use tracing::warn;

/// A message for the user. The pipeline emits at most one per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connectivity,
    RateLimited { wait: Duration },
    SessionExpired,
    Failure { message: String },
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::Connectivity => "Network error. Please check your connection.".to_owned(),
            Notice::RateLimited { wait } => format!(
                "Too many requests. Please wait {} seconds.",
                wait.as_secs()
            ),
            Notice::SessionExpired => "Session expired. Please log in again.".to_owned(),
            Notice::Failure { message } => message.clone(),
        }
    }
}

/// Sink for notices, implemented by whatever shows them (toast, status bar, log).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier that writes notices to the tracing log. Useful for headless clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        warn!(notice = %notice.text(), "user notice");
    }
}

/// Where to send the user once their session is gone.
///
/// The pipeline only builds the target; the caller's router performs the
/// navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIntent {
    target: String,
    return_to: String,
}

impl NavigationIntent {
    /// `<login_path>?redirect=<percent-encoded return_to>`
    pub fn login_redirect(login_path: &str, return_to: &str) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        Self {
            target: format!("{login_path}?redirect={encoded}"),
            return_to: return_to.to_owned(),
        }
    }

    /// Full path to navigate to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The location the user was on, for after login.
    pub fn return_to(&self) -> &str {
        &self.return_to
    }
}
