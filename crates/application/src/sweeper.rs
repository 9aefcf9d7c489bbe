//! 会话清扫后台任务。
//!
//! 周期性驱逐两枚令牌都已过期的会话，并把心跳静默的连接按断线处理，
//! 清理其在所有频道的在场状态。

use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;

use crate::{channels::ChannelDirectory, session::SessionRegistry};

pub fn spawn(
    registry: Arc<SessionRegistry>,
    directory: Arc<ChannelDirectory>,
    sweep: config::SweepConfig,
) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(sweep.interval_secs.max(1));
    let heartbeat_timeout = Duration::seconds(sweep.heartbeat_timeout_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 起步的第一个 tick 立即返回，跳过
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let outcome = registry.sweep(heartbeat_timeout).await;
            for user_id in outcome
                .evicted
                .iter()
                .chain(outcome.disconnected.iter())
            {
                directory.disconnect(*user_id).await;
            }
            if !outcome.evicted.is_empty() || !outcome.disconnected.is_empty() {
                tracing::debug!(
                    evicted = outcome.evicted.len(),
                    disconnected = outcome.disconnected.len(),
                    "session sweep finished"
                );
            }
        }
    })
}
