//! Error types for network plumbing.

use thiserror::Error;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors that can occur during network plumbing.
#[derive(Debug, Error)]
pub enum NetError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Netlink error.
    #[error("netlink error: {0}")]
    Netlink(String),

    /// Namespace entry error (handle acquisition or switch-in failed;
    /// the calling context is still in its original namespace).
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Address parse or assignment error.
    #[error("address error: {0}")]
    Address(String),

    /// Bridge error.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// Namespace restore failed. The worker thread may still be inside
    /// a foreign namespace; the caller should treat this as fatal.
    #[error(
        "critical: failed to restore original network namespace: {restore}{}",
        .action.as_deref().map(|a| format!(" (action error: {a})")).unwrap_or_default()
    )]
    Critical {
        /// The restore failure itself.
        restore: String,
        /// The action error, if the action had also failed.
        action: Option<String>,
    },
}

impl NetError {
    /// True for the distinguished restore-failure error.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Critical { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_display_includes_both_failures() {
        let err = NetError::Critical {
            restore: "EPERM".to_string(),
            action: Some("interface not found".to_string()),
        };
        let text = err.to_string();
        assert!(text.starts_with("critical:"));
        assert!(text.contains("EPERM"));
        assert!(text.contains("interface not found"));
        assert!(err.is_critical());
    }

    #[test]
    fn critical_display_without_action_error() {
        let err = NetError::Critical {
            restore: "EBADF".to_string(),
            action: None,
        };
        assert!(!err.to_string().contains("action error"));
    }
}
