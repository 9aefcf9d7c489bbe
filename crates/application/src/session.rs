//! 进程级会话注册表。
//!
//! 活跃访问令牌到 (用户, 会话, 实时连接句柄) 的映射。令牌索引用一把
//! 读写锁维护，每个会话条目再各持一把互斥锁：刷新旋转的比较交换在
//! 会话自己的锁下完成，互不相干的会话并发互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use config::AuthConfig;
use domain::{DomainError, SessionState, Timestamp, TokenPair, UserId, UserView};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::clock::Clock;
use crate::connection::ConnectionHandle;
use crate::token;

/// 通过访问令牌解析出的已认证身份。
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub session_id: Uuid,
    pub user: UserView,
}

struct SessionEntry {
    user: UserView,
    state: SessionState,
    access_token: String,
    access_expires_at: Timestamp,
    refresh_token: String,
    refresh_expires_at: Timestamp,
    last_seen: Timestamp,
    connection: Option<ConnectionHandle>,
}

#[derive(Default)]
struct RegistryIndex {
    sessions: HashMap<Uuid, Arc<Mutex<SessionEntry>>>,
    by_access: HashMap<String, Uuid>,
    by_refresh: HashMap<String, Uuid>,
}

/// 清扫结果：被驱逐的会话属主，以及仅被判定断线的会话属主。
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub evicted: Vec<UserId>,
    pub disconnected: Vec<UserId>,
}

pub struct SessionRegistry {
    index: RwLock<RegistryIndex>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>, auth: &AuthConfig) -> Self {
        Self {
            index: RwLock::new(RegistryIndex::default()),
            clock,
            access_ttl: Duration::seconds(auth.access_ttl_secs),
            refresh_ttl: Duration::seconds(auth.refresh_ttl_secs),
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// 为用户铸造一对新令牌并登记新会话（一次登录一个会话，多端并存）。
    pub async fn issue(&self, user: UserView) -> TokenPair {
        let now = self.clock.now();
        let session_id = Uuid::new_v4();
        let pair = TokenPair {
            access_token: token::mint(),
            expires_in: self.access_ttl.num_seconds(),
            refresh_token: token::mint(),
        };

        let entry = SessionEntry {
            user,
            state: SessionState::Active,
            access_token: pair.access_token.clone(),
            access_expires_at: now + self.access_ttl,
            refresh_token: pair.refresh_token.clone(),
            refresh_expires_at: now + self.refresh_ttl,
            last_seen: now,
            connection: None,
        };

        let mut index = self.index.write().await;
        index
            .by_access
            .insert(pair.access_token.clone(), session_id);
        index
            .by_refresh
            .insert(pair.refresh_token.clone(), session_id);
        index
            .sessions
            .insert(session_id, Arc::new(Mutex::new(entry)));

        tracing::debug!(session_id = %session_id, "session issued");
        pair
    }

    async fn entry_by_access(&self, access_token: &str) -> Option<(Uuid, Arc<Mutex<SessionEntry>>)> {
        let index = self.index.read().await;
        let session_id = *index.by_access.get(access_token)?;
        let entry = index.sessions.get(&session_id)?.clone();
        Some((session_id, entry))
    }

    /// 访问令牌校验。未知、过期、已撤销一律返回同一个 Unauthorized。
    pub async fn validate_access(
        &self,
        access_token: &str,
    ) -> Result<AuthenticatedUser, DomainError> {
        let (session_id, entry) = self
            .entry_by_access(access_token)
            .await
            .ok_or(DomainError::Unauthorized)?;

        let entry = entry.lock().await;
        let now = self.clock.now();
        if entry.state != SessionState::Active
            || entry.access_token != access_token
            || now >= entry.access_expires_at
        {
            return Err(DomainError::Unauthorized);
        }

        Ok(AuthenticatedUser {
            session_id,
            user: entry.user.clone(),
        })
    }

    /// 心跳：校验之余刷新会话的最后活跃时间。
    pub async fn touch(&self, access_token: &str) -> Result<AuthenticatedUser, DomainError> {
        let (session_id, entry) = self
            .entry_by_access(access_token)
            .await
            .ok_or(DomainError::Unauthorized)?;

        let mut entry = entry.lock().await;
        let now = self.clock.now();
        if entry.state != SessionState::Active
            || entry.access_token != access_token
            || now >= entry.access_expires_at
        {
            return Err(DomainError::Unauthorized);
        }
        entry.last_seen = now;

        Ok(AuthenticatedUser {
            session_id,
            user: entry.user.clone(),
        })
    }

    /// 单次有效的刷新旋转。
    ///
    /// 在会话自己的锁下做比较交换：存储的刷新令牌必须仍等于调用方出示的
    /// 那一枚。并发刷新同一枚令牌时只有第一个拿到锁的调用成功，其余在
    /// 比较处失败——绝不双发。旧令牌对在交换的同时作废。
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, DomainError> {
        let (session_id, entry) = {
            let index = self.index.read().await;
            let session_id = *index
                .by_refresh
                .get(refresh_token)
                .ok_or(DomainError::Unauthorized)?;
            let entry = index
                .sessions
                .get(&session_id)
                .ok_or(DomainError::Unauthorized)?
                .clone();
            (session_id, entry)
        };

        let mut entry = entry.lock().await;
        let now = self.clock.now();
        if entry.state != SessionState::Active
            || entry.refresh_token != refresh_token
            || now >= entry.refresh_expires_at
        {
            return Err(DomainError::Unauthorized);
        }

        let pair = TokenPair {
            access_token: token::mint(),
            expires_in: self.access_ttl.num_seconds(),
            refresh_token: token::mint(),
        };

        let old_access = std::mem::replace(&mut entry.access_token, pair.access_token.clone());
        let old_refresh = std::mem::replace(&mut entry.refresh_token, pair.refresh_token.clone());
        entry.access_expires_at = now + self.access_ttl;
        entry.refresh_expires_at = now + self.refresh_ttl;
        entry.last_seen = now;

        // 仍持有会话锁，索引换新：旧令牌在此刻之后不再命中
        {
            let mut index = self.index.write().await;
            index.by_access.remove(&old_access);
            index.by_refresh.remove(&old_refresh);
            index
                .by_access
                .insert(pair.access_token.clone(), session_id);
            index
                .by_refresh
                .insert(pair.refresh_token.clone(), session_id);
        }

        tracing::debug!(session_id = %session_id, "session tokens rotated");
        Ok(pair)
    }

    /// 登出：撤销会话，两枚令牌立即失效。返回属主和连接句柄供上层清理。
    pub async fn revoke(
        &self,
        access_token: &str,
    ) -> Result<(UserId, Option<ConnectionHandle>), DomainError> {
        let (session_id, entry) = self
            .entry_by_access(access_token)
            .await
            .ok_or(DomainError::Unauthorized)?;

        let (user_id, connection, refresh_token) = {
            let mut entry = entry.lock().await;
            let now = self.clock.now();
            if entry.state != SessionState::Active
                || entry.access_token != access_token
                || now >= entry.access_expires_at
            {
                return Err(DomainError::Unauthorized);
            }
            entry.state = SessionState::Revoked;
            (
                entry.user.id,
                entry.connection.take(),
                entry.refresh_token.clone(),
            )
        };

        let mut index = self.index.write().await;
        index.by_access.remove(access_token);
        index.by_refresh.remove(&refresh_token);
        index.sessions.remove(&session_id);

        tracing::info!(session_id = %session_id, user_id = %user_id, "session revoked");
        Ok((user_id, connection))
    }

    /// 撤销某用户除指定会话外的所有会话（改密策略可选开启）。
    pub async fn revoke_all_for_user(&self, user_id: UserId, keep: Uuid) -> usize {
        let candidates: Vec<(Uuid, Arc<Mutex<SessionEntry>>)> = {
            let index = self.index.read().await;
            index
                .sessions
                .iter()
                .filter(|(id, _)| **id != keep)
                .map(|(id, entry)| (*id, entry.clone()))
                .collect()
        };

        let mut revoked = Vec::new();
        for (session_id, entry) in candidates {
            let mut entry = entry.lock().await;
            if entry.user.id != user_id || entry.state != SessionState::Active {
                continue;
            }
            entry.state = SessionState::Revoked;
            entry.connection = None;
            revoked.push((
                session_id,
                entry.access_token.clone(),
                entry.refresh_token.clone(),
            ));
        }

        let count = revoked.len();
        if !revoked.is_empty() {
            let mut index = self.index.write().await;
            for (session_id, access, refresh) in revoked {
                index.by_access.remove(&access);
                index.by_refresh.remove(&refresh);
                index.sessions.remove(&session_id);
            }
        }
        count
    }

    /// 绑定实时连接句柄（WebSocket 建立后调用）。
    pub async fn attach_connection(
        &self,
        session_id: Uuid,
        handle: ConnectionHandle,
    ) -> Result<(), DomainError> {
        let entry = {
            let index = self.index.read().await;
            index
                .sessions
                .get(&session_id)
                .ok_or(DomainError::Unauthorized)?
                .clone()
        };
        let mut entry = entry.lock().await;
        if entry.state != SessionState::Active {
            return Err(DomainError::Unauthorized);
        }
        entry.connection = Some(handle);
        Ok(())
    }

    /// 解除连接绑定（断线时调用），返回属主以便清理在场状态。
    pub async fn detach_connection(&self, session_id: Uuid) -> Option<UserId> {
        let entry = {
            let index = self.index.read().await;
            index.sessions.get(&session_id)?.clone()
        };
        let mut entry = entry.lock().await;
        entry.connection = None;
        Some(entry.user.id)
    }

    /// 会话的当前连接句柄。
    pub async fn connection(&self, session_id: Uuid) -> Option<ConnectionHandle> {
        let entry = {
            let index = self.index.read().await;
            index.sessions.get(&session_id)?.clone()
        };
        let entry = entry.lock().await;
        entry.connection.clone()
    }

    /// 定期清扫：
    /// - 访问令牌和刷新令牌都已过期的会话整条驱逐；
    /// - 心跳静默超过 `heartbeat_timeout` 的会话视为断线，仅摘除连接。
    pub async fn sweep(&self, heartbeat_timeout: Duration) -> SweepOutcome {
        let candidates: Vec<(Uuid, Arc<Mutex<SessionEntry>>)> = {
            let index = self.index.read().await;
            index
                .sessions
                .iter()
                .map(|(id, entry)| (*id, entry.clone()))
                .collect()
        };

        let now = self.clock.now();
        let mut outcome = SweepOutcome::default();
        let mut to_remove = Vec::new();

        for (session_id, entry) in candidates {
            let mut entry = entry.lock().await;
            let fully_expired =
                now >= entry.access_expires_at && now >= entry.refresh_expires_at;
            if entry.state == SessionState::Revoked || fully_expired {
                entry.connection = None;
                outcome.evicted.push(entry.user.id);
                to_remove.push((
                    session_id,
                    entry.access_token.clone(),
                    entry.refresh_token.clone(),
                ));
            } else if entry.connection.is_some() && now - entry.last_seen > heartbeat_timeout {
                entry.connection = None;
                outcome.disconnected.push(entry.user.id);
            }
        }

        if !to_remove.is_empty() {
            let mut index = self.index.write().await;
            for (session_id, access, refresh) in &to_remove {
                index.by_access.remove(access);
                index.by_refresh.remove(refresh);
                index.sessions.remove(session_id);
            }
            tracing::info!(count = to_remove.len(), "expired sessions evicted");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::FixedClock;
    use domain::{UserId, Username};

    fn test_user(id: i64, name: &str) -> UserView {
        UserView {
            id: UserId::new(id),
            username: Username::parse(name).unwrap(),
            email: None,
        }
    }

    fn registry(clock: Arc<FixedClock>) -> SessionRegistry {
        let auth = config::AuthConfig {
            access_ttl_secs: 900,
            refresh_ttl_secs: 3600,
            revoke_sessions_on_password_change: false,
            bcrypt_cost: None,
        };
        SessionRegistry::new(clock, &auth)
    }

    #[tokio::test]
    async fn issued_access_token_validates() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock);
        let pair = registry.issue(test_user(1, "alice")).await;

        let auth = registry.validate_access(&pair.access_token).await.unwrap();
        assert_eq!(auth.user.id, UserId::new(1));
        assert_eq!(pair.expires_in, 900);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock.clone());
        let pair = registry.issue(test_user(1, "alice")).await;

        clock.advance_secs(901);
        assert_eq!(
            registry.validate_access(&pair.access_token).await,
            Err(DomainError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_pair_dies() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock);
        let pair1 = registry.issue(test_user(1, "alice")).await;

        let pair2 = registry.refresh(&pair1.refresh_token).await.unwrap();
        assert_ne!(pair1.access_token, pair2.access_token);

        // 旧访问令牌立即失效，旧刷新令牌单次有效
        assert!(registry.validate_access(&pair1.access_token).await.is_err());
        assert_eq!(
            registry.refresh(&pair1.refresh_token).await,
            Err(DomainError::Unauthorized)
        );
        assert!(registry.validate_access(&pair2.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_refresh_issues_exactly_once() {
        let clock = Arc::new(FixedClock::default());
        let registry = Arc::new(registry(clock));
        let pair = registry.issue(test_user(1, "alice")).await;

        let (a, b) = tokio::join!(
            registry.refresh(&pair.refresh_token),
            registry.refresh(&pair.refresh_token),
        );
        assert!(a.is_ok() != b.is_ok(), "exactly one refresh may win");
    }

    #[tokio::test]
    async fn revoke_kills_both_tokens() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock);
        let pair = registry.issue(test_user(1, "alice")).await;

        registry.revoke(&pair.access_token).await.unwrap();
        assert!(registry.validate_access(&pair.access_token).await.is_err());
        assert_eq!(
            registry.refresh(&pair.refresh_token).await,
            Err(DomainError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn sweep_evicts_only_fully_expired_sessions() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock.clone());
        let pair = registry.issue(test_user(1, "alice")).await;

        // 访问令牌过期但刷新令牌仍有效：保留
        clock.advance_secs(1000);
        let outcome = registry.sweep(Duration::seconds(90)).await;
        assert!(outcome.evicted.is_empty());
        assert!(registry.refresh(&pair.refresh_token).await.is_ok());

        // 两者都过期：驱逐
        clock.advance_secs(4000);
        let outcome = registry.sweep(Duration::seconds(90)).await;
        assert_eq!(outcome.evicted, vec![UserId::new(1)]);
    }

    #[tokio::test]
    async fn sweep_detaches_silent_connections() {
        let clock = Arc::new(FixedClock::default());
        let registry = registry(clock.clone());
        let pair = registry.issue(test_user(1, "alice")).await;
        let auth = registry.validate_access(&pair.access_token).await.unwrap();

        let (handle, _rx) = ConnectionHandle::new(auth.session_id);
        registry
            .attach_connection(auth.session_id, handle)
            .await
            .unwrap();

        clock.advance_secs(120);
        let outcome = registry.sweep(Duration::seconds(90)).await;
        assert_eq!(outcome.disconnected, vec![UserId::new(1)]);
        assert!(registry.connection(auth.session_id).await.is_none());
        // 会话本身未被驱逐
        assert!(registry.validate_access(&pair.access_token).await.is_ok());
    }
}
