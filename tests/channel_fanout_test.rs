// Channel fan-out: membership-gated sends, per-member delivery, the
// configurable echo policy, and membership re-resolution at send time.

use std::time::Duration;

use courier_server::message::{
    ChannelSendRequest, ClientFrame, MessagePayload, MessageType, ServerFrame,
};

mod common;
use common::{TestClient, settle, spawn_app, spawn_app_with_echo};

fn text_payload(content: &str) -> MessagePayload {
    MessagePayload {
        message_type: MessageType::Text,
        content: Some(content.to_string()),
        file: None,
    }
}

fn channel_send(sender: &str, channel_id: &str, content: &str) -> ClientFrame {
    ClientFrame::ChannelSend(ChannelSendRequest {
        sender: sender.to_string(),
        channel_id: channel_id.to_string(),
        payload: text_payload(content),
    })
}

#[tokio::test]
async fn fanout_reaches_every_member_and_nobody_else() {
    let app = spawn_app().await;
    for u in ["a", "b", "d", "e"] {
        app.store.add_user(u);
    }
    app.store.add_channel("c", "general", "a", &["b", "d"]);

    let mut a = TestClient::connect_as(&app, "a").await;
    let mut b = TestClient::connect_as(&app, "b").await;
    let mut d = TestClient::connect_as(&app, "d").await;
    let mut e = TestClient::connect_as(&app, "e").await;

    a.send(&channel_send("a", "c", "hello channel")).await;

    match a.recv().await {
        Some(ServerFrame::Sent { .. }) => {}
        other => panic!("Expected Sent ack, got: {:?}", other),
    }

    for member in [&mut b, &mut d] {
        match member.recv().await {
            Some(ServerFrame::Message(msg)) => {
                assert_eq!(msg.sender, "a");
                assert_eq!(msg.payload.content.as_deref(), Some("hello channel"));
            }
            other => panic!("Expected Message for member, got: {:?}", other),
        }
    }

    // Exactly one dispatch per member, zero for the non-member.
    b.expect_silence(Duration::from_millis(300)).await;
    e.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn echo_reaches_the_senders_other_device_but_not_the_origin() {
    let app = spawn_app().await;
    app.store.add_user("a");
    app.store.add_user("b");
    app.store.add_channel("c", "general", "a", &["b"]);

    let mut a_origin = TestClient::connect_as(&app, "a").await;
    let mut a_other = TestClient::connect_as(&app, "a").await;
    let mut b = TestClient::connect_as(&app, "b").await;

    a_origin.send(&channel_send("a", "c", "sync me")).await;

    // Origin sees the ack only; its own message is never echoed back to it.
    match a_origin.recv().await {
        Some(ServerFrame::Sent { .. }) => {}
        other => panic!("Expected Sent ack, got: {:?}", other),
    }
    a_origin.expect_silence(Duration::from_millis(300)).await;

    match a_other.recv().await {
        Some(ServerFrame::Message(msg)) => {
            assert_eq!(msg.payload.content.as_deref(), Some("sync me"));
        }
        other => panic!("Expected echo on the other device, got: {:?}", other),
    }

    match b.recv().await {
        Some(ServerFrame::Message(_)) => {}
        other => panic!("Expected Message for member, got: {:?}", other),
    }
}

#[tokio::test]
async fn echo_disabled_skips_the_senders_devices() {
    let app = spawn_app_with_echo(false).await;
    app.store.add_user("a");
    app.store.add_user("b");
    app.store.add_channel("c", "general", "a", &["b"]);

    let mut a_origin = TestClient::connect_as(&app, "a").await;
    let mut a_other = TestClient::connect_as(&app, "a").await;
    let mut b = TestClient::connect_as(&app, "b").await;

    a_origin.send(&channel_send("a", "c", "quiet")).await;

    match a_origin.recv().await {
        Some(ServerFrame::Sent { .. }) => {}
        other => panic!("Expected Sent ack, got: {:?}", other),
    }
    a_other.expect_silence(Duration::from_millis(300)).await;

    match b.recv().await {
        Some(ServerFrame::Message(_)) => {}
        other => panic!("Expected Message for member, got: {:?}", other),
    }
}

#[tokio::test]
async fn non_member_sends_are_forbidden() {
    let app = spawn_app().await;
    app.store.add_user("a");
    app.store.add_user("b");
    app.store.add_user("e");
    app.store.add_channel("c", "general", "a", &["b"]);

    let mut e = TestClient::connect_as(&app, "e").await;
    e.send(&channel_send("e", "c", "let me in")).await;

    match e.recv().await {
        Some(ServerFrame::Error { code, .. }) => assert_eq!(code, "FORBIDDEN"),
        other => panic!("Expected Error, got: {:?}", other),
    }
}

#[tokio::test]
async fn unknown_channel_is_rejected() {
    let app = spawn_app().await;
    app.store.add_user("a");

    let mut a = TestClient::connect_as(&app, "a").await;
    a.send(&channel_send("a", "nowhere", "hello?")).await;

    match a.recv().await {
        Some(ServerFrame::Error { code, .. }) => assert_eq!(code, "NOT_FOUND"),
        other => panic!("Expected Error, got: {:?}", other),
    }
}

#[tokio::test]
async fn membership_is_rechecked_on_every_send() {
    let app = spawn_app().await;
    for u in ["a", "b", "d"] {
        app.store.add_user(u);
    }
    app.store.add_channel("c", "general", "a", &["b", "d"]);

    let mut a = TestClient::connect_as(&app, "a").await;
    let mut d = TestClient::connect_as(&app, "d").await;

    a.send(&channel_send("a", "c", "before")).await;
    match d.recv().await {
        Some(ServerFrame::Message(_)) => {}
        other => panic!("Expected Message before removal, got: {:?}", other),
    }

    // The external membership service removes d; the next send must not
    // reach them.
    app.store.remove_channel_member("c", "d");
    settle().await;

    a.send(&channel_send("a", "c", "after")).await;
    d.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn channel_history_is_membership_gated() {
    let app = spawn_app().await;
    for u in ["a", "b", "e"] {
        app.store.add_user(u);
    }
    app.store.add_channel("c", "general", "a", &["b"]);

    let mut a = TestClient::connect_as(&app, "a").await;
    a.send(&channel_send("a", "c", "one")).await;
    let _ = a.recv().await; // ack
    a.send(&channel_send("a", "c", "two")).await;
    let _ = a.recv().await; // ack

    let mut b = TestClient::connect_as(&app, "b").await;
    b.send(&ClientFrame::ChannelHistory {
        channel_id: "c".to_string(),
    })
    .await;
    match b.recv().await {
        Some(ServerFrame::History { messages }) => {
            let contents: Vec<_> = messages
                .iter()
                .map(|m| m.payload.content.clone().unwrap())
                .collect();
            assert_eq!(contents, vec!["one", "two"]);
            assert!(messages[0].timestamp < messages[1].timestamp);
        }
        other => panic!("Expected History, got: {:?}", other),
    }

    let mut e = TestClient::connect_as(&app, "e").await;
    e.send(&ClientFrame::ChannelHistory {
        channel_id: "c".to_string(),
    })
    .await;
    match e.recv().await {
        Some(ServerFrame::Error { code, .. }) => assert_eq!(code, "FORBIDDEN"),
        other => panic!("Expected Error, got: {:?}", other),
    }
}
