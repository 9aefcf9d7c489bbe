//! 测试用内存实现：存储假件、可控时钟、明文哈希器。
//! 所有服务与分发器测试都建在这套假件上，不需要数据库。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use domain::{
    ChannelId, ChannelRecord, Message, MessageId, PasswordHash, RepositoryError, Timestamp, User,
    UserEmail, UserId, Username,
};
use tokio::sync::Mutex;

use crate::{
    channels::ChannelDirectory,
    clock::Clock,
    dispatch::{Dispatcher, DispatcherDependencies},
    password::{PasswordHasher, PasswordHasherError},
    repository::{ChannelRepository, MessageRepository, UserRepository},
    services::{AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies},
    session::SessionRegistry,
};

pub struct FixedClock {
    now: StdMutex<Timestamp>,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self {
            now: StdMutex::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
        }
    }
}

impl FixedClock {
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds(secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<Vec<User>>,
    next_id: AtomicI64,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(
        &self,
        username: &Username,
        email: &UserEmail,
        password: &PasswordHash,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().await;
        if users
            .iter()
            .any(|u| u.username == *username || u.email == *email)
        {
            return Err(RepositoryError::Conflict);
        }
        let user = User {
            id: UserId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            username: username.clone(),
            email: email.clone(),
            password: password.clone(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|u| u.username.as_str() == login || u.email.as_str() == login)
            .cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.email == *email).cloned())
    }

    async fn update_password(
        &self,
        id: UserId,
        password: &PasswordHash,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.password = password.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryChannelRepository {
    channels: Mutex<HashMap<ChannelId, ChannelRecord>>,
    pub create_calls: AtomicI64,
}

impl InMemoryChannelRepository {
    pub async fn seed(&self, id: &str, name: &str) {
        let id = ChannelId::parse(id).unwrap();
        let record = ChannelRecord::new(id.clone(), name);
        self.channels.lock().await.insert(id, record);
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn find_by_id(&self, id: &ChannelId) -> Result<Option<ChannelRecord>, RepositoryError> {
        Ok(self.channels.lock().await.get(id).cloned())
    }

    async fn create_if_absent(&self, record: &ChannelRecord) -> Result<(), RepositoryError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.channels
            .lock()
            .await
            .entry(record.id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn list_static(&self) -> Result<Vec<ChannelRecord>, RepositoryError> {
        let channels = self.channels.lock().await;
        let mut records: Vec<_> = channels
            .values()
            .filter(|r| !r.id.is_direct())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(records)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<HashMap<ChannelId, Vec<Message>>>,
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, channel: &ChannelId, message: &Message) -> Result<(), RepositoryError> {
        let mut messages = self.messages.lock().await;
        let log = messages.entry(channel.clone()).or_default();
        if log.iter().any(|m| m.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        log.push(message.clone());
        Ok(())
    }

    async fn list_recent(
        &self,
        channel: &ChannelId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().await;
        let log = messages.get(channel).cloned().unwrap_or_default();
        let skip = log.len().saturating_sub(limit as usize);
        Ok(log.into_iter().skip(skip).collect())
    }

    async fn list_before(
        &self,
        channel: &ChannelId,
        before: MessageId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.lock().await;
        let older: Vec<Message> = messages
            .get(channel)
            .map(|log| log.iter().filter(|m| m.id < before).cloned().collect())
            .unwrap_or_default();
        let skip = older.len().saturating_sub(limit as usize);
        Ok(older.into_iter().skip(skip).collect())
    }

    async fn max_id(&self, channel: &ChannelId) -> Result<i64, RepositoryError> {
        let messages = self.messages.lock().await;
        Ok(messages
            .get(channel)
            .and_then(|log| log.iter().map(|m| m.id.as_i64()).max())
            .unwrap_or(0))
    }
}

/// 明文“哈希”，只给测试用。
pub struct PlainPasswordHasher;

#[async_trait]
impl PasswordHasher for PlainPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

/// 一整套装配好的测试环境。
pub struct TestEnv {
    pub clock: Arc<FixedClock>,
    pub user_repository: Arc<InMemoryUserRepository>,
    pub channel_repository: Arc<InMemoryChannelRepository>,
    pub message_repository: Arc<InMemoryMessageRepository>,
    pub registry: Arc<SessionRegistry>,
    pub directory: Arc<ChannelDirectory>,
    pub auth_service: Arc<AuthService>,
    pub chat_service: Arc<ChatService>,
    pub dispatcher: Dispatcher,
}

pub fn test_auth_config() -> config::AuthConfig {
    config::AuthConfig {
        access_ttl_secs: 900,
        refresh_ttl_secs: 30 * 24 * 3600,
        revoke_sessions_on_password_change: false,
        bcrypt_cost: None,
    }
}

pub fn test_channel_config() -> config::ChannelConfig {
    config::ChannelConfig {
        history_window: 50,
        page_limit_max: 100,
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(test_auth_config(), test_channel_config(), vec![])
    }

    pub fn with_config(
        auth: config::AuthConfig,
        channels: config::ChannelConfig,
        allowed_clients: Vec<String>,
    ) -> Self {
        let clock = Arc::new(FixedClock::default());
        let user_repository = Arc::new(InMemoryUserRepository::default());
        let channel_repository = Arc::new(InMemoryChannelRepository::default());
        let message_repository = Arc::new(InMemoryMessageRepository::default());

        let registry = Arc::new(SessionRegistry::new(clock.clone(), &auth));
        let directory = Arc::new(ChannelDirectory::new(
            channel_repository.clone(),
            message_repository.clone(),
            user_repository.clone(),
            &channels,
        ));

        let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
            user_repository: user_repository.clone(),
            password_hasher: Arc::new(PlainPasswordHasher),
            registry: registry.clone(),
            directory: directory.clone(),
            revoke_sessions_on_password_change: auth.revoke_sessions_on_password_change,
        }));

        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            registry: registry.clone(),
            directory: directory.clone(),
            clock: clock.clone(),
        }));

        let dispatcher = Dispatcher::new(DispatcherDependencies {
            clients: config::ClientConfig {
                allowed: allowed_clients,
            },
            registry: registry.clone(),
            auth_service: auth_service.clone(),
            chat_service: chat_service.clone(),
        });

        Self {
            clock,
            user_repository,
            channel_repository,
            message_repository,
            registry,
            directory,
            auth_service,
            chat_service,
            dispatcher,
        }
    }

    /// 注册并登录，返回登录数据。
    pub async fn register_and_login(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> crate::services::LoginData {
        self.auth_service
            .register(username, email, password)
            .await
            .unwrap();
        self.auth_service.login(username, password).await.unwrap()
    }
}
