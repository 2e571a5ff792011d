//! Reward granting for earned XP.
//!
//! The engine accumulates XP per session and flushes grants when the
//! session ends. The actual on-chain granter is an external collaborator;
//! the default implementation here just logs and drops.

use std::sync::Arc;

use async_trait::async_trait;

use crate::infrastructure::ports::{AdventureRecord, RewardPort};
use crate::infrastructure::session::XpGrant;

/// No-op granter used when no reward backend is configured.
pub struct DisabledRewards;

#[async_trait]
impl RewardPort for DisabledRewards {
    async fn grant(&self, token_id: u64, amount: u32) {
        tracing::debug!(token_id, amount, "XP grant dropped (rewards disabled)");
    }

    async fn record_adventure(&self, record: AdventureRecord) {
        tracing::debug!(
            floor = record.floor,
            result = record.result,
            xp = record.xp_earned,
            kills = record.kill_count,
            "Adventure record dropped (rewards disabled)"
        );
    }
}

/// Push a session's drained grants and final stats to the reward port.
///
/// Fire-and-forget from the caller's perspective: spawn this, never await
/// it on the connection path.
pub async fn flush_rewards(
    rewards: Arc<dyn RewardPort>,
    grants: Vec<XpGrant>,
    record: AdventureRecord,
) {
    for grant in grants {
        rewards.grant(grant.token_id, grant.amount).await;
    }
    rewards.record_adventure(record).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockRewardPort;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn flush_grants_each_token_then_records() {
        let mut mock = MockRewardPort::new();
        mock.expect_grant()
            .with(eq(7u64), eq(40u32))
            .times(1)
            .return_const(());
        mock.expect_grant()
            .with(eq(9u64), eq(40u32))
            .times(1)
            .return_const(());
        mock.expect_record_adventure()
            .withf(|record| record.floor == 2 && record.kill_count == 3)
            .times(1)
            .return_const(());

        let record = AdventureRecord {
            token_ids: vec![7, 9],
            floor: 2,
            result: 0,
            xp_earned: 80,
            kill_count: 3,
        };
        let grants = vec![
            XpGrant {
                token_id: 7,
                amount: 40,
            },
            XpGrant {
                token_id: 9,
                amount: 40,
            },
        ];

        flush_rewards(Arc::new(mock), grants, record).await;
    }
}
