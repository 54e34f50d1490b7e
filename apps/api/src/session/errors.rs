//! Voice transport error classification.
//!
//! Raw errors from the browser SDK and the transport vendor are free-form
//! strings. They are bucketed by keyword into a fixed taxonomy that decides
//! the user-facing message and whether the client should offer a retry.

use serde::Serialize;

const NETWORK_MARKERS: [&str; 7] = [
    "network",
    "connection",
    "disconnect",
    "offline",
    "econnreset",
    "dns",
    "socket",
];

const QUOTA_MARKERS: [&str; 5] = [
    "quota",
    "rate limit",
    "429",
    "insufficient",
    "limit exceeded",
];

const TIMEOUT_MARKERS: [&str; 3] = ["timeout", "timed out", "deadline"];

const PERMISSION_MARKERS: [&str; 5] = [
    "permission",
    "denied",
    "unauthorized",
    "forbidden",
    "not allowed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceErrorKind {
    Network,
    Quota,
    Timeout,
    Permission,
    Unknown,
}

impl VoiceErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VoiceErrorKind::Network => "network",
            VoiceErrorKind::Quota => "quota",
            VoiceErrorKind::Timeout => "timeout",
            VoiceErrorKind::Permission => "permission",
            VoiceErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorClass {
    pub kind: VoiceErrorKind,
    pub user_message: &'static str,
    /// Whether the client should offer a retry. Transient transport problems
    /// are retryable; quota and permission failures are not.
    pub should_retry: bool,
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// Buckets a raw error. The optional vendor code participates in matching
/// (some SDKs put the useful part there and leave the message generic).
pub fn classify_error(error: &str, code: Option<&str>) -> ErrorClass {
    let mut haystack = error.to_lowercase();
    if let Some(code) = code {
        haystack.push(' ');
        haystack.push_str(&code.to_lowercase());
    }

    // Permission and quota are checked before network: "connection denied"
    // should read as a permission problem, not a flaky link.
    if contains_any(&haystack, &PERMISSION_MARKERS) {
        return ErrorClass {
            kind: VoiceErrorKind::Permission,
            user_message: "Microphone or account permissions blocked the call. Check your browser and account settings.",
            should_retry: false,
        };
    }
    if contains_any(&haystack, &QUOTA_MARKERS) {
        return ErrorClass {
            kind: VoiceErrorKind::Quota,
            user_message: "You've reached your plan's usage limit for now.",
            should_retry: false,
        };
    }
    if contains_any(&haystack, &TIMEOUT_MARKERS) {
        return ErrorClass {
            kind: VoiceErrorKind::Timeout,
            user_message: "The call took too long to respond. Please try again.",
            should_retry: true,
        };
    }
    if contains_any(&haystack, &NETWORK_MARKERS) {
        return ErrorClass {
            kind: VoiceErrorKind::Network,
            user_message: "Connection problem during the call. Check your network and try again.",
            should_retry: true,
        };
    }

    ErrorClass {
        kind: VoiceErrorKind::Unknown,
        user_message: "Something went wrong with the call. Please try again.",
        should_retry: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        let class = classify_error("WebRTC connection dropped: ECONNRESET", None);
        assert_eq!(class.kind, VoiceErrorKind::Network);
        assert!(class.should_retry);
    }

    #[test]
    fn test_quota_errors_are_not_retryable() {
        let class = classify_error("Provider rejected call: rate limit exceeded", None);
        assert_eq!(class.kind, VoiceErrorKind::Quota);
        assert!(!class.should_retry);
    }

    #[test]
    fn test_permission_wins_over_network() {
        let class = classify_error("connection denied by browser", None);
        assert_eq!(class.kind, VoiceErrorKind::Permission);
        assert!(!class.should_retry);
    }

    #[test]
    fn test_code_participates_in_matching() {
        let class = classify_error("call failed", Some("429"));
        assert_eq!(class.kind, VoiceErrorKind::Quota);
    }

    #[test]
    fn test_timeout_classification() {
        let class = classify_error("Assistant timed out waiting for audio", None);
        assert_eq!(class.kind, VoiceErrorKind::Timeout);
        assert!(class.should_retry);
    }

    #[test]
    fn test_unrecognized_errors_default_to_unknown_retryable() {
        let class = classify_error("entropy cascade in flux capacitor", None);
        assert_eq!(class.kind, VoiceErrorKind::Unknown);
        assert!(class.should_retry);
    }
}
