//! Messaging capability
//!
//! The external surface the state layer calls out through: delivering a
//! payload to one identity and querying an identity's membership in a gated
//! channel. Implemented by the chat-protocol glue; the runtime only sees
//! this trait. A send failure is a transient per-item outcome, never a
//! reason to abort a batch.

use async_trait::async_trait;

use chatgate_core::{ChannelId, IdentityId, Result};

// ----------------------------------------------------------------------------
// Membership Status
// ----------------------------------------------------------------------------

/// An identity's standing in one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    /// Currently a member
    Member,
    /// Left on their own
    Left,
    /// Removed by a moderator
    Kicked,
}

impl MembershipStatus {
    /// Whether this status satisfies a channel gate
    pub fn satisfies_gate(&self) -> bool {
        matches!(self, MembershipStatus::Member)
    }
}

// ----------------------------------------------------------------------------
// Messenger Trait
// ----------------------------------------------------------------------------

/// Outbound messaging operations the runtime consumes
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `payload` to `identity`
    async fn send(&self, identity: IdentityId, payload: &str) -> Result<()>;

    /// Query `identity`'s standing in `channel`
    async fn membership_status(
        &self,
        channel: ChannelId,
        identity: IdentityId,
    ) -> Result<MembershipStatus>;
}

// ----------------------------------------------------------------------------
// Mock Messenger
// ----------------------------------------------------------------------------

/// Scriptable in-memory messenger for tests
#[derive(Debug, Default)]
pub struct MockMessenger {
    sent: std::sync::Mutex<Vec<(IdentityId, String)>>,
    failing: std::sync::Mutex<std::collections::HashSet<IdentityId>>,
    memberships:
        std::sync::Mutex<std::collections::HashMap<(ChannelId, IdentityId), MembershipStatus>>,
}

impl MockMessenger {
    /// Create a messenger that accepts everything and knows no memberships
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future send to `identity` fail
    pub fn fail_sends_to(&self, identity: IdentityId) {
        self.failing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(identity);
    }

    /// Script `identity`'s status in `channel`; unscripted pairs report
    /// [`MembershipStatus::Left`]
    pub fn set_membership(
        &self,
        channel: ChannelId,
        identity: IdentityId,
        status: MembershipStatus,
    ) {
        self.memberships
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((channel, identity), status);
    }

    /// Payloads delivered so far, in send order
    pub fn sent(&self) -> Vec<(IdentityId, String)> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn send(&self, identity: IdentityId, payload: &str) -> Result<()> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&identity);
        if failing {
            return Err(chatgate_core::ChatgateError::send_failed(
                identity,
                "scripted failure",
            ));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((identity, payload.to_string()));
        Ok(())
    }

    async fn membership_status(
        &self,
        channel: ChannelId,
        identity: IdentityId,
    ) -> Result<MembershipStatus> {
        let memberships = self
            .memberships
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(memberships
            .get(&(channel, identity))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_member_satisfies_gate() {
        assert!(MembershipStatus::Member.satisfies_gate());
        assert!(!MembershipStatus::Left.satisfies_gate());
        assert!(!MembershipStatus::Kicked.satisfies_gate());
    }

    #[tokio::test]
    async fn test_mock_messenger_scripts() {
        let messenger = MockMessenger::new();
        let ok = IdentityId::new(1);
        let bad = IdentityId::new(2);
        messenger.fail_sends_to(bad);

        assert!(messenger.send(ok, "hi").await.is_ok());
        assert!(messenger.send(bad, "hi").await.is_err());
        assert_eq!(messenger.sent(), vec![(ok, "hi".to_string())]);

        let channel = ChannelId::new(-5);
        messenger.set_membership(channel, ok, MembershipStatus::Member);
        assert_eq!(
            messenger.membership_status(channel, ok).await.unwrap(),
            MembershipStatus::Member
        );
        assert_eq!(
            messenger.membership_status(channel, bad).await.unwrap(),
            MembershipStatus::Left
        );
    }
}
