use crate::domain::ids::UserId;

/// Lowercases `raw` and keeps only `[a-z0-9_-]`. Whitespace is dropped, so
/// `"Alice Smith"` becomes `"alicesmith"`; an all-disallowed name yields `""`.
pub fn sanitize_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketNaming {
    prefix: String,
}

impl TicketNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}-{sanitized}`: the part every ticket of one user shares.
    pub fn stem(&self, sanitized: &str) -> String {
        format!("{}-{sanitized}", self.prefix)
    }

    pub fn channel_name(&self, sanitized: &str, user_id: UserId) -> String {
        format!("{}-{user_id}", self.stem(sanitized))
    }

    pub fn is_ticket_channel(&self, channel_name: &str) -> bool {
        channel_name.starts_with(&self.prefix)
    }

    pub fn is_owned_by(&self, channel_name: &str, sanitized: &str, user_id: UserId) -> bool {
        channel_name.starts_with(&self.stem(sanitized))
            && channel_name.contains(&user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_name, TicketNaming};
    use crate::domain::ids::UserId;

    #[test]
    fn sanitize_keeps_only_lowercase_alphanumerics_dash_and_underscore() {
        assert_eq!(sanitize_name("Alice_Smith-99"), "alice_smith-99");
        assert_eq!(sanitize_name("Alice Smith"), "alicesmith");
        assert_eq!(sanitize_name("B.o.b!"), "bob");
        assert_eq!(sanitize_name("ユーザー"), "");
        assert_eq!(sanitize_name("   "), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["Alice", "MiXeD Case_name", "émile-ß", "🎫ticket🎫", "", "a--b__c"] {
            let once = sanitize_name(raw);
            assert_eq!(sanitize_name(&once), once, "sanitize should be idempotent for {raw:?}");
            let allowed =
                |ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_';
            assert!(once.chars().all(allowed));
        }
    }

    #[test]
    fn channel_name_joins_prefix_name_and_user_id() {
        let naming = TicketNaming::new("kujo-ticket");
        assert_eq!(naming.channel_name("alice", UserId(42)), "kujo-ticket-alice-42");
        assert_eq!(naming.channel_name("", UserId(42)), "kujo-ticket--42");
    }

    #[test]
    fn ownership_requires_stem_prefix_and_user_id() {
        let naming = TicketNaming::new("kujo-ticket");

        assert!(naming.is_owned_by("kujo-ticket-alice-42", "alice", UserId(42)));
        assert!(naming.is_owned_by("kujo-ticket-alice-old-42", "alice", UserId(42)));
        assert!(!naming.is_owned_by("kujo-ticket-alice-43", "alice", UserId(42)));
        assert!(!naming.is_owned_by("kujo-ticket-bob-42", "alice", UserId(42)));
        assert!(!naming.is_owned_by("general", "alice", UserId(42)));
    }

    #[test]
    fn ticket_channels_are_recognised_by_prefix() {
        let naming = TicketNaming::new("kujo-ticket");
        assert!(naming.is_ticket_channel("kujo-ticket-alice-42"));
        assert!(!naming.is_ticket_channel("support"));
    }
}
