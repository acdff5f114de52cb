//! 拉黑准入策略
//!
//! 拉黑关系是有向边；被足够多的不同用户拉黑后账号进入限时封禁，
//! 封禁只能由自动解封任务在到期后解除。

use std::sync::Arc;

use config::BlockingConfig;
use domain::{BlockEscalationRule, BlockRelation, Timestamp, User, UserId};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{BlockRepository, UserRepository},
};

/// 一次拉黑操作的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutcome {
    /// 拉黑 `target` 的不同用户数
    pub blocker_count: u64,
    /// 本次操作触发的账号封禁截止时间
    pub account_blocked_until: Option<Timestamp>,
}

/// 由配置构造升级规则
pub fn escalation_rule(config: &BlockingConfig) -> BlockEscalationRule {
    let cooldown = chrono::Duration::from_std(config.cooldown())
        .unwrap_or_else(|_| BlockEscalationRule::default().cooldown);
    BlockEscalationRule::new(config.threshold, cooldown)
}

pub struct AdmissionPolicy {
    users: Arc<dyn UserRepository>,
    blocks: Arc<dyn BlockRepository>,
    clock: Arc<dyn Clock>,
    rule: BlockEscalationRule,
}

impl AdmissionPolicy {
    pub fn new(
        users: Arc<dyn UserRepository>,
        blocks: Arc<dyn BlockRepository>,
        clock: Arc<dyn Clock>,
        rule: BlockEscalationRule,
    ) -> Self {
        Self {
            users,
            blocks,
            clock,
            rule,
        }
    }

    pub fn rule(&self) -> BlockEscalationRule {
        self.rule
    }

    /// `a` 是否拉黑了 `b`
    pub async fn is_blocked(&self, a: UserId, b: UserId) -> Result<bool, ApplicationError> {
        Ok(self.blocks.exists(a, b).await?)
    }

    /// 任一方向存在拉黑即视为互相屏蔽
    pub async fn is_mutually_blocked(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<bool, ApplicationError> {
        if self.blocks.exists(a, b).await? {
            return Ok(true);
        }
        Ok(self.blocks.exists(b, a).await?)
    }

    pub async fn block(
        &self,
        actor: UserId,
        target: UserId,
    ) -> Result<BlockOutcome, ApplicationError> {
        let relation = BlockRelation::new(actor, target)?;
        let target_user = self
            .users
            .find_by_id(target)
            .await?
            .ok_or(ApplicationError::UserNotFound)?;

        self.blocks.insert(relation).await?;
        let blocker_count = self.blocks.count_blockers(target).await?;
        tracing::info!(
            actor = %actor,
            target = %target,
            blocker_count,
            "user blocked"
        );

        let now = self.clock.now();
        let mut account_blocked_until = None;
        // 已到期但尚未被清扫的封禁视同未封禁
        if !target_user.is_blocked || target_user.block_expired(now) {
            if let Some(until) = self.rule.escalate(blocker_count, now) {
                self.users.block_account_until(target, until).await?;
                tracing::warn!(
                    target = %target,
                    blocker_count,
                    until = %until,
                    "blocker threshold reached, account blocked"
                );
                account_blocked_until = Some(until);
            }
        }

        Ok(BlockOutcome {
            blocker_count,
            account_blocked_until,
        })
    }

    /// 只移除拉黑边，不会解除账号级封禁
    pub async fn unblock(&self, actor: UserId, target: UserId) -> Result<(), ApplicationError> {
        let relation = BlockRelation::new(actor, target)?;
        self.blocks.remove(relation).await?;
        tracing::info!(actor = %actor, target = %target, "user unblocked");
        Ok(())
    }

    /// 发送前检查：发送者账号被封禁，或与任一其他成员互相屏蔽时否决
    pub async fn check_send(
        &self,
        sender: &User,
        members: &[User],
    ) -> Result<(), ApplicationError> {
        if sender.is_blocked {
            tracing::warn!(user_id = %sender.id, "send rejected, account is blocked");
            return Err(ApplicationError::BlockedInteraction);
        }
        for member in members.iter().filter(|m| m.id != sender.id) {
            if self.is_mutually_blocked(sender.id, member.id).await? {
                tracing::warn!(
                    user_id = %sender.id,
                    peer = %member.id,
                    "send rejected, users are blocked"
                );
                return Err(ApplicationError::BlockedInteraction);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryChatStore;
    use chrono::{Duration, Utc};

    async fn setup() -> (AdmissionPolicy, MemoryChatStore, Arc<ManualClock>, Vec<User>) {
        let store = MemoryChatStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut users = Vec::new();
        for name in ["a", "b", "c", "d"] {
            users.push(store.add_user(name, clock.now()).await);
        }
        let policy = AdmissionPolicy::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            BlockEscalationRule::new(2, Duration::hours(24)),
        );
        (policy, store, clock, users)
    }

    #[tokio::test]
    async fn blocking_is_directed_but_mutual_check_is_symmetric() {
        let (policy, _store, _clock, users) = setup().await;
        let (a, b) = (users[0].id, users[1].id);
        policy.block(a, b).await.unwrap();

        assert!(policy.is_blocked(a, b).await.unwrap());
        assert!(!policy.is_blocked(b, a).await.unwrap());
        assert!(policy.is_mutually_blocked(b, a).await.unwrap());
    }

    #[tokio::test]
    async fn self_block_is_rejected() {
        let (policy, _store, _clock, users) = setup().await;
        let err = policy.block(users[0].id, users[0].id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn repeated_block_by_same_user_does_not_escalate() {
        let (policy, _store, _clock, users) = setup().await;
        let (a, target) = (users[0].id, users[3].id);
        let first = policy.block(a, target).await.unwrap();
        let second = policy.block(a, target).await.unwrap();
        assert_eq!(first.blocker_count, 1);
        assert_eq!(second.blocker_count, 1);
        assert!(second.account_blocked_until.is_none());
    }

    #[tokio::test]
    async fn threshold_blocks_account_and_unblock_keeps_it() {
        let (policy, store, clock, users) = setup().await;
        let target = users[3].id;
        policy.block(users[0].id, target).await.unwrap();
        let outcome = policy.block(users[1].id, target).await.unwrap();
        assert_eq!(
            outcome.account_blocked_until,
            Some(clock.now() + Duration::hours(24))
        );

        policy.unblock(users[0].id, target).await.unwrap();
        policy.unblock(users[1].id, target).await.unwrap();
        let user = UserRepository::find_by_id(&store, target)
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_blocked);
    }

    #[tokio::test]
    async fn expired_unswept_block_escalates_again() {
        let (policy, store, clock, users) = setup().await;
        let target = users[3].id;
        policy.block(users[0].id, target).await.unwrap();
        policy.block(users[1].id, target).await.unwrap();

        clock.advance(Duration::hours(25));
        let outcome = policy.block(users[2].id, target).await.unwrap();
        let renewed = clock.now() + Duration::hours(24);
        assert_eq!(outcome.account_blocked_until, Some(renewed));

        let user = UserRepository::find_by_id(&store, target)
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_blocked);
        assert_eq!(user.blocked_until, Some(renewed));
    }

    #[tokio::test]
    async fn huge_configured_cooldown_does_not_overflow() {
        let store = MemoryChatStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let a = store.add_user("a", clock.now()).await;
        let b = store.add_user("b", clock.now()).await;
        let config = BlockingConfig {
            threshold: 1,
            cooldown_secs: 1_000_000_000_000_000,
            sweep_interval_secs: 60,
        };
        let policy = AdmissionPolicy::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock,
            escalation_rule(&config),
        );

        let outcome = policy.block(a.id, b.id).await.unwrap();
        assert!(outcome.account_blocked_until.is_some());
    }

    #[tokio::test]
    async fn check_send_vetoes_blocked_pairs() {
        let (policy, _store, _clock, users) = setup().await;
        let (a, b, c) = (&users[0], &users[1], &users[2]);
        let members = vec![a.clone(), b.clone()];
        policy.check_send(a, &members).await.unwrap();

        policy.block(b.id, a.id).await.unwrap();
        assert!(matches!(
            policy.check_send(a, &members).await,
            Err(ApplicationError::BlockedInteraction)
        ));
        // 与未拉黑的成员之间不受影响
        policy
            .check_send(c, &[c.clone(), b.clone()])
            .await
            .unwrap();
    }
}
