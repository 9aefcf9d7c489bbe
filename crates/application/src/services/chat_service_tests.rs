//! 频道与消息用例测试：选择、在场、投递顺序、翻页、私聊创建、实时推送。

use domain::{DomainError, MessageId, UserId};

use crate::connection::{ConnectionHandle, ServerEvent};
use crate::error::ApplicationError;
use crate::services::test_support::TestEnv;
use crate::session::AuthenticatedUser;

async fn login(env: &TestEnv, name: &str, email: &str) -> AuthenticatedUser {
    let tokens = env.register_and_login(name, email, "pw").await.tokens;
    env.registry
        .validate_access(&tokens.access_token)
        .await
        .unwrap()
}

fn assert_not_found(err: ApplicationError) {
    match err {
        ApplicationError::Domain(DomainError::NotFound { .. }) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_static_channel_is_not_found() {
    let env = TestEnv::new();
    let alice = login(&env, "alice", "a@x.com").await;

    assert_not_found(
        env.chat_service
            .select(&alice, "nowhere")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn malformed_channel_id_is_not_found() {
    let env = TestEnv::new();
    let alice = login(&env, "alice", "a@x.com").await;

    assert_not_found(
        env.chat_service
            .select(&alice, "Bad Channel!")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn select_is_idempotent_on_presence() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;

    let first = env.chat_service.select(&alice, "general").await.unwrap();
    let second = env.chat_service.select(&alice, "general").await.unwrap();
    assert_eq!(first.users.len(), 1);
    assert_eq!(second.users.len(), 1);
}

#[tokio::test]
async fn presence_hides_emails() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    env.chat_service.select(&alice, "general").await.unwrap();
    let seen_by_bob = env.chat_service.select(&bob, "general").await.unwrap();

    assert!(seen_by_bob.users.iter().all(|u| u.email.is_none()));
}

#[tokio::test]
async fn direct_channel_is_created_on_demand_and_canonicalized() {
    let env = TestEnv::new();
    let alice = login(&env, "alice", "a@x.com").await; // id 1
    let bob = login(&env, "bob", "b@x.com").await; // id 2

    let a_view = env.chat_service.select(&alice, "dm:2:1").await.unwrap();
    let b_view = env.chat_service.select(&bob, "dm:1:2").await.unwrap();
    assert_eq!(a_view.id, b_view.id);
    assert_eq!(a_view.id.as_str(), "dm:1:2");
}

#[tokio::test]
async fn direct_channel_requires_both_users_to_exist() {
    let env = TestEnv::new();
    let alice = login(&env, "alice", "a@x.com").await;

    assert_not_found(
        env.chat_service
            .select(&alice, "dm:1:99")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn outsider_cannot_select_a_direct_channel() {
    let env = TestEnv::new();
    let _alice = login(&env, "alice", "a@x.com").await; // id 1
    let _bob = login(&env, "bob", "b@x.com").await; // id 2
    let carol = login(&env, "carol", "c@x.com").await; // id 3

    assert_not_found(
        env.chat_service
            .select(&carol, "dm:1:2")
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn concurrent_first_selects_create_the_channel_once() {
    let env = TestEnv::new();
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    let (a, b) = tokio::join!(
        env.chat_service.select(&alice, "dm:1:2"),
        env.chat_service.select(&bob, "dm:1:2"),
    );
    a.unwrap();
    b.unwrap();

    // 槽位锁保证真正的加载只发生一次
    assert_eq!(
        env.channel_repository
            .create_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn submit_requires_presence() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    env.chat_service.select(&alice, "general").await.unwrap();

    // bob 从未选择该频道
    let err = env
        .chat_service
        .submit(&bob, "general", "hi")
        .await
        .unwrap_err();
    match err {
        ApplicationError::Domain(DomainError::Unauthorized) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_text_is_invalid() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();

    let err = env
        .chat_service
        .submit(&alice, "general", "   ")
        .await
        .unwrap_err();
    match err {
        ApplicationError::Domain(DomainError::Invalid { .. }) => {}
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[tokio::test]
async fn message_ids_start_at_one_and_increase() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();

    let m1 = env
        .chat_service
        .submit(&alice, "general", "hi")
        .await
        .unwrap();
    let m2 = env
        .chat_service
        .submit(&alice, "general", "there")
        .await
        .unwrap();
    assert_eq!(m1.id, MessageId::new(1));
    assert_eq!(m2.id, MessageId::new(2));

    // channel-messages(before=2, limit=10) 只返回第一条
    let page = env
        .chat_service
        .history(&alice, "general", Some(MessageId::new(2)), 10)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, MessageId::new(1));
    assert_eq!(page[0].text.as_str(), "hi");
}

#[tokio::test]
async fn both_members_observe_the_same_order() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();
    env.chat_service.select(&bob, "general").await.unwrap();

    for text in ["one", "two", "three"] {
        env.chat_service
            .submit(&alice, "general", text)
            .await
            .unwrap();
    }

    let seen_by_alice = env
        .chat_service
        .history(&alice, "general", None, 10)
        .await
        .unwrap();
    let seen_by_bob = env
        .chat_service
        .history(&bob, "general", None, 10)
        .await
        .unwrap();
    assert_eq!(seen_by_alice, seen_by_bob);
    let ids: Vec<i64> = seen_by_alice.iter().map(|m| m.id.as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[tokio::test]
async fn paging_backwards_is_disjoint_and_gapless() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();

    for i in 0..10 {
        env.chat_service
            .submit(&alice, "general", &format!("msg {i}"))
            .await
            .unwrap();
    }

    let page1 = env
        .chat_service
        .history(&alice, "general", Some(MessageId::new(9)), 3)
        .await
        .unwrap();
    let oldest = page1.first().unwrap().id;
    let page2 = env
        .chat_service
        .history(&alice, "general", Some(oldest), 3)
        .await
        .unwrap();

    let ids1: Vec<i64> = page1.iter().map(|m| m.id.as_i64()).collect();
    let ids2: Vec<i64> = page2.iter().map(|m| m.id.as_i64()).collect();
    assert_eq!(ids1, vec![6, 7, 8]);
    assert_eq!(ids2, vec![3, 4, 5]);
}

#[tokio::test]
async fn history_requires_membership() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();

    assert_not_found(
        env.chat_service
            .history(&bob, "general", None, 10)
            .await
            .unwrap_err(),
    );
}

#[tokio::test]
async fn submit_fans_out_to_other_connected_members_only() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    let (alice_handle, mut alice_rx) = ConnectionHandle::new(alice.session_id);
    let (bob_handle, mut bob_rx) = ConnectionHandle::new(bob.session_id);
    env.registry
        .attach_connection(alice.session_id, alice_handle)
        .await
        .unwrap();
    env.registry
        .attach_connection(bob.session_id, bob_handle)
        .await
        .unwrap();

    env.chat_service.select(&alice, "general").await.unwrap();
    env.chat_service.select(&bob, "general").await.unwrap();

    let sent = env
        .chat_service
        .submit(&alice, "general", "hi")
        .await
        .unwrap();

    // 其他在场成员收到推送
    let ServerEvent::Message { channel, message } = bob_rx.try_recv().unwrap();
    assert_eq!(channel.as_str(), "general");
    assert_eq!(message, sent);
    // 提交者自己不收自己的消息
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn dropped_receiver_does_not_fail_submit() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    let (bob_handle, bob_rx) = ConnectionHandle::new(bob.session_id);
    env.registry
        .attach_connection(bob.session_id, bob_handle)
        .await
        .unwrap();
    env.chat_service.select(&alice, "general").await.unwrap();
    env.chat_service.select(&bob, "general").await.unwrap();
    drop(bob_rx); // 接收端断开

    // 对单个收件人的投递失败不影响提交本身
    assert!(env.chat_service.submit(&alice, "general", "hi").await.is_ok());
}

#[tokio::test]
async fn disconnect_clears_presence_everywhere() {
    let env = TestEnv::new();
    env.channel_repository.seed("general", "General").await;
    env.channel_repository.seed("random", "Random").await;
    let alice = login(&env, "alice", "a@x.com").await;
    let bob = login(&env, "bob", "b@x.com").await;

    env.chat_service.select(&alice, "general").await.unwrap();
    env.chat_service.select(&alice, "random").await.unwrap();
    env.chat_service.select(&bob, "general").await.unwrap();

    env.chat_service.disconnect(alice.session_id).await;

    let general = env.chat_service.select(&bob, "general").await.unwrap();
    assert_eq!(
        general.users.iter().map(|u| u.id).collect::<Vec<_>>(),
        vec![UserId::new(2)]
    );
}

#[tokio::test]
async fn window_is_capped_but_history_is_not() {
    let mut channels = crate::services::test_support::test_channel_config();
    channels.history_window = 3;
    let env = TestEnv::with_config(
        crate::services::test_support::test_auth_config(),
        channels,
        vec![],
    );
    env.channel_repository.seed("general", "General").await;
    let alice = login(&env, "alice", "a@x.com").await;
    env.chat_service.select(&alice, "general").await.unwrap();

    for i in 0..5 {
        env.chat_service
            .submit(&alice, "general", &format!("msg {i}"))
            .await
            .unwrap();
    }

    // 快照窗口只保留最近 3 条
    let snapshot = env.chat_service.select(&alice, "general").await.unwrap();
    let ids: Vec<i64> = snapshot.messages.iter().map(|m| m.id.as_i64()).collect();
    assert_eq!(ids, vec![3, 4, 5]);

    // 持久化历史完整保留
    let all = env
        .chat_service
        .history(&alice, "general", Some(MessageId::new(4)), 10)
        .await
        .unwrap();
    let ids: Vec<i64> = all.iter().map(|m| m.id.as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
