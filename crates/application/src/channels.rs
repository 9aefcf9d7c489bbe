//! 频道目录。
//!
//! 进程级共享状态：每个频道一个槽位，槽位互斥锁串行化该频道的在场
//! 变更和消息 id 分配（单频道内线性一致），不同频道完全并行。外层
//! 读写锁只保护槽位表结构本身，持有时间极短。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use domain::{
    AppData, Channel, ChannelId, ChannelRecord, DomainError, Message, MessageId, MessageText,
    Timestamp, UserId, UserView,
};
use tokio::sync::{Mutex, RwLock};

use crate::connection::{ConnectionHandle, ServerEvent};
use crate::error::ApplicationError;
use crate::repository::{ChannelRepository, MessageRepository, UserRepository};

struct PresenceEntry {
    user: UserView,
    connection: Option<ConnectionHandle>,
}

struct ChannelState {
    record: ChannelRecord,
    /// 最近一次分配出去的消息 id；持久化失败不推进，不留空洞
    last_message_id: i64,
    /// 内存中的最近消息窗口，超出 history_window 从头部驱逐
    recent: VecDeque<Message>,
    present: HashMap<UserId, PresenceEntry>,
}

impl ChannelState {
    fn snapshot(&self) -> Channel {
        Channel {
            id: self.record.id.clone(),
            name: self.record.name.clone(),
            messages: self.recent.iter().cloned().collect(),
            users: self.present.values().map(|p| p.user.clone()).collect(),
        }
    }
}

/// 槽位先于状态存在：并发的首次选择会拿到同一个槽位锁，
/// 只有第一个进入的调用真正加载/创建频道。
type ChannelSlot = Option<ChannelState>;

pub struct ChannelDirectory {
    slots: RwLock<HashMap<ChannelId, Arc<Mutex<ChannelSlot>>>>,
    channel_repository: Arc<dyn ChannelRepository>,
    message_repository: Arc<dyn MessageRepository>,
    user_repository: Arc<dyn UserRepository>,
    history_window: usize,
    page_limit_max: u32,
}

impl ChannelDirectory {
    pub fn new(
        channel_repository: Arc<dyn ChannelRepository>,
        message_repository: Arc<dyn MessageRepository>,
        user_repository: Arc<dyn UserRepository>,
        channels: &config::ChannelConfig,
    ) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            channel_repository,
            message_repository,
            user_repository,
            history_window: channels.history_window,
            page_limit_max: channels.page_limit_max,
        }
    }

    fn parse_channel(raw: &str) -> Result<ChannelId, DomainError> {
        // 形状不合法的 id 对外等同于频道不存在
        ChannelId::parse(raw).map_err(|_| DomainError::not_found("channel"))
    }

    async fn slot(&self, id: &ChannelId) -> Arc<Mutex<ChannelSlot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(id) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// 已加载槽位的快捷路径；频道从未被选择过时返回 None。
    async fn loaded_slot(&self, id: &ChannelId) -> Option<Arc<Mutex<ChannelSlot>>> {
        let slots = self.slots.read().await;
        slots.get(id).cloned()
    }

    /// 在槽位锁下完成加载：静态频道必须已登记；私聊频道校验双方存在后
    /// 幂等创建。`requester` 限定只有参与双方能选择私聊频道。
    async fn load_state(
        &self,
        id: &ChannelId,
        requester: Option<UserId>,
    ) -> Result<ChannelState, ApplicationError> {
        let record = match self.channel_repository.find_by_id(id).await? {
            Some(record) => record,
            None if id.is_direct() => {
                let (a, b) = id
                    .direct_peers()
                    .ok_or_else(|| DomainError::not_found("channel"))?;
                if let Some(requester) = requester {
                    if requester != a && requester != b {
                        return Err(DomainError::not_found("channel").into());
                    }
                }
                if self.user_repository.find_by_id(a).await?.is_none()
                    || self.user_repository.find_by_id(b).await?.is_none()
                {
                    return Err(DomainError::not_found("channel").into());
                }
                let record = ChannelRecord::direct(id.clone());
                self.channel_repository.create_if_absent(&record).await?;
                tracing::info!(channel = %id, "direct channel materialized");
                record
            }
            None => return Err(DomainError::not_found("channel").into()),
        };

        let recent = self
            .message_repository
            .list_recent(id, self.history_window as u32)
            .await?;
        let last_message_id = self.message_repository.max_id(id).await?;

        Ok(ChannelState {
            record,
            last_message_id,
            recent: recent.into(),
            present: HashMap::new(),
        })
    }

    /// 选择频道：加入在场集合（幂等）并返回频道快照。
    ///
    /// `connection` 是会话当前的实时连接句柄；重复选择会刷新句柄绑定，
    /// 在场集合不变。
    pub async fn select(
        &self,
        user: &UserView,
        connection: Option<ConnectionHandle>,
        raw_channel: &str,
    ) -> Result<Channel, ApplicationError> {
        let id = Self::parse_channel(raw_channel)?;
        if id.is_direct() {
            // 私聊频道只有参与双方可见
            let (a, b) = id
                .direct_peers()
                .ok_or_else(|| DomainError::not_found("channel"))?;
            if user.id != a && user.id != b {
                return Err(DomainError::not_found("channel").into());
            }
        }

        let slot = self.slot(&id).await;
        let mut slot = slot.lock().await;
        if slot.is_none() {
            *slot = Some(self.load_state(&id, Some(user.id)).await?);
        }
        let state = slot.as_mut().expect("slot loaded above");

        state.present.insert(
            user.id,
            PresenceEntry {
                user: user.clone(),
                connection,
            },
        );
        tracing::debug!(channel = %id, user_id = %user.id, "user joined channel");

        Ok(state.snapshot())
    }

    /// 向过去翻页。要求请求者当前在场，否则对外表现为频道不存在。
    pub async fn history(
        &self,
        user_id: UserId,
        raw_channel: &str,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, ApplicationError> {
        let id = Self::parse_channel(raw_channel)?;
        let limit = limit.clamp(1, self.page_limit_max);

        let slot = self
            .loaded_slot(&id)
            .await
            .ok_or_else(|| DomainError::not_found("channel"))?;
        {
            let slot = slot.lock().await;
            let state = slot
                .as_ref()
                .ok_or_else(|| DomainError::not_found("channel"))?;
            if !state.present.contains_key(&user_id) {
                return Err(DomainError::not_found("channel").into());
            }
        }

        // 存储访问在槽位锁外：翻页只读已持久化的前缀，与新消息追加无竞争
        let page = match before {
            Some(before) => self.message_repository.list_before(&id, before, limit).await?,
            None => self.message_repository.list_recent(&id, limit).await?,
        };
        Ok(page)
    }

    /// 投递一条消息：分配频道内下一个 id、落库、进窗口、向其他在场
    /// 成员的连接尽力推送。持久化失败不推进 id，不留空洞。
    pub async fn submit(
        &self,
        user_id: UserId,
        raw_channel: &str,
        text: &str,
        now: Timestamp,
    ) -> Result<Message, ApplicationError> {
        let id = Self::parse_channel(raw_channel)?;
        let text = MessageText::new(text)?;

        let slot = self
            .loaded_slot(&id)
            .await
            .ok_or_else(|| DomainError::not_found("channel"))?;
        let mut slot = slot.lock().await;
        let state = slot
            .as_mut()
            .ok_or_else(|| DomainError::not_found("channel"))?;

        if !state.present.contains_key(&user_id) {
            // 在场是投递的前提条件
            return Err(DomainError::Unauthorized.into());
        }

        let message = Message::new(
            MessageId::new(state.last_message_id + 1),
            user_id,
            now,
            text,
        );
        self.message_repository.insert(&id, &message).await?;
        state.last_message_id = message.id.as_i64();

        state.recent.push_back(message.clone());
        while state.recent.len() > self.history_window {
            state.recent.pop_front();
        }

        let mut delivered = 0usize;
        for (member_id, entry) in &state.present {
            if *member_id == user_id {
                continue;
            }
            if let Some(connection) = &entry.connection {
                if connection.push(ServerEvent::Message {
                    channel: id.clone(),
                    message: message.clone(),
                }) {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(
            channel = %id,
            message_id = %message.id,
            delivered,
            "message routed"
        );

        Ok(message)
    }

    /// 把用户从所有频道的在场集合移除（断线、登出、清扫共用）。
    pub async fn disconnect(&self, user_id: UserId) {
        let slots: Vec<Arc<Mutex<ChannelSlot>>> = {
            let slots = self.slots.read().await;
            slots.values().cloned().collect()
        };
        for slot in slots {
            let mut slot = slot.lock().await;
            if let Some(state) = slot.as_mut() {
                if state.present.remove(&user_id).is_some() {
                    tracing::debug!(channel = %state.record.id, user_id = %user_id, "user left channel");
                }
            }
        }
    }

    /// 登录快照：所有静态频道的当前状态（不加入在场集合）。
    pub async fn app_data(&self) -> Result<AppData, ApplicationError> {
        let records = self.channel_repository.list_static().await?;
        let mut channels = Vec::with_capacity(records.len());
        for record in records {
            let slot = self.slot(&record.id).await;
            let mut slot = slot.lock().await;
            if slot.is_none() {
                *slot = Some(self.load_state(&record.id, None).await?);
            }
            channels.push(slot.as_ref().expect("slot loaded above").snapshot());
        }
        Ok(AppData { channels })
    }
}
