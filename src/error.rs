//! Typed provider errors.
//!
//! The gateway reports failures as free text. [`ProviderError::classify`] is
//! the only place that inspects that text; everything downstream branches on
//! the enum.
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("cannot resolve entity: {0}")]
    IdentityResolution(String),
    #[error("flood wait of {0} seconds")]
    RateLimited(u64),
    #[error("account is banned from this chat")]
    Banned,
    #[error("account is not a participant")]
    NotAMember,
    #[error("account cannot send messages here")]
    PermissionDenied,
    #[error("join request is awaiting approval")]
    ApprovalRequired,
    #[error("provider error: {0}")]
    Transient(String),
}

static FLOOD_WAIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:FLOOD_WAIT_(\d+)|wait of (\d+) seconds|retry after (\d+))")
        .expect("valid flood wait regex")
});

static IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(USERNAME_INVALID|USERNAME_NOT_OCCUPIED|CHANNEL_INVALID|PEER_ID_INVALID|no user has|cannot find any entity|could not find the input entity|chat not found)",
    )
    .expect("valid identity regex")
});

static BANNED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(USER_BANNED_IN_CHANNEL|CHANNEL_PRIVATE|banned|kicked)")
        .expect("valid ban regex")
});

static NOT_MEMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(USER_NOT_PARTICIPANT|not a member|not a participant|not participant)")
        .expect("valid participant regex")
});

static PERMISSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(CHAT_WRITE_FORBIDDEN|CHAT_SEND_\w*FORBIDDEN|CHAT_ADMIN_REQUIRED|write forbidden|not enough rights)")
        .expect("valid permission regex")
});

static APPROVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(approv|request|pending|moderat|invite)").expect("valid approval regex")
});

impl ProviderError {
    /// Maps gateway error text (and an optional explicit retry hint) onto the
    /// taxonomy. Order matters: flood waits first, approval keywords last.
    pub fn classify(text: &str, retry_after: Option<u64>) -> Self {
        if let Some(secs) = retry_after {
            return ProviderError::RateLimited(secs);
        }
        if let Some(caps) = FLOOD_WAIT.captures(text) {
            let secs = caps
                .iter()
                .skip(1)
                .flatten()
                .find_map(|m| m.as_str().parse::<u64>().ok());
            if let Some(secs) = secs {
                return ProviderError::RateLimited(secs);
            }
        }
        if IDENTITY.is_match(text) {
            return ProviderError::IdentityResolution(text.to_string());
        }
        if BANNED.is_match(text) {
            return ProviderError::Banned;
        }
        if NOT_MEMBER.is_match(text) {
            return ProviderError::NotAMember;
        }
        if PERMISSION.is_match(text) {
            return ProviderError::PermissionDenied;
        }
        if APPROVAL.is_match(text) {
            return ProviderError::ApprovalRequired;
        }
        ProviderError::Transient(text.to_string())
    }
}
