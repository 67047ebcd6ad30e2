use std::sync::Arc;
use std::time::Duration;

use bridge_host::testguest::{
    GuestScript, HangingPrompts, ScriptedGuest, ScriptedInteraction, StaticPrompts,
};
use bridge_host::{BridgeConfig, BridgeHandle, InterpreterBridge, PromptService, SessionState};
use bridge_protocol::{InteractionKind, InteractionValue};
use bridge_store::{DynSnapshotStore, MemSnapshotStore};

async fn launch(guest: &ScriptedGuest, prompts: Arc<dyn PromptService>) -> BridgeHandle {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    InterpreterBridge::launch(
        BridgeConfig::default(),
        Arc::new(MemSnapshotStore::new()) as DynSnapshotStore,
        Arc::new(guest.clone()),
        prompts,
    )
    .await
    .expect("launch")
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn confirm_request_round_trips_the_operator_answer() {
    let interaction = ScriptedInteraction::new(InteractionKind::Confirm);
    let id = interaction.id.clone();
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        ..GuestScript::default()
    });
    let _handle = launch(
        &guest,
        Arc::new(StaticPrompts {
            confirm: Some(true),
            ..StaticPrompts::default()
        }),
    )
    .await;

    wait_until("confirm response", || !guest.responses().is_empty()).await;
    assert_eq!(guest.responses(), vec![(id, InteractionValue::Bool(true))]);
}

#[tokio::test]
async fn dismissed_confirm_defaults_to_false() {
    let interaction = ScriptedInteraction::new(InteractionKind::Confirm);
    let id = interaction.id.clone();
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        ..GuestScript::default()
    });
    let _handle = launch(
        &guest,
        Arc::new(StaticPrompts {
            confirm: None,
            ..StaticPrompts::default()
        }),
    )
    .await;

    wait_until("confirm response", || !guest.responses().is_empty()).await;
    assert_eq!(guest.responses(), vec![(id, InteractionValue::Bool(false))]);
}

#[tokio::test]
async fn dismissed_value_prompt_resolves_to_cancelled() {
    let interaction = ScriptedInteraction::new(InteractionKind::PromptForValue);
    let id = interaction.id.clone();
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        ..GuestScript::default()
    });
    let _handle = launch(
        &guest,
        Arc::new(StaticPrompts {
            value: None,
            ..StaticPrompts::default()
        }),
    )
    .await;

    wait_until("value response", || !guest.responses().is_empty()).await;
    assert_eq!(guest.responses(), vec![(id, InteractionValue::Cancelled)]);
}

#[tokio::test]
async fn pause_notice_is_acknowledged_with_unit() {
    let interaction = ScriptedInteraction::new(InteractionKind::Pause);
    let id = interaction.id.clone();
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        ..GuestScript::default()
    });
    let _handle = launch(&guest, Arc::new(StaticPrompts::default())).await;

    wait_until("pause response", || !guest.responses().is_empty()).await;
    assert_eq!(guest.responses(), vec![(id, InteractionValue::Unit)]);
}

#[tokio::test]
async fn redelivered_request_is_answered_exactly_once() {
    let interaction = ScriptedInteraction::new(InteractionKind::Confirm);
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        repeat_requests: true,
        ..GuestScript::default()
    });
    let _handle = launch(&guest, Arc::new(StaticPrompts::default())).await;

    wait_until("confirm response", || !guest.responses().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(guest.responses().len(), 1);
}

#[tokio::test]
async fn relaunch_cancels_every_pending_interaction() {
    let value_prompt = ScriptedInteraction::new(InteractionKind::PromptForValue);
    let confirm = ScriptedInteraction::new(InteractionKind::Confirm);
    let mut expected_ids = vec![value_prompt.id.clone(), confirm.id.clone()];
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![value_prompt, confirm],
        ..GuestScript::default()
    });
    let handle = launch(&guest, Arc::new(HangingPrompts)).await;
    handle.wait_for_state(SessionState::Ready).await.expect("ready");

    // Let both requests reach the broker, then tear the session down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(guest.responses().is_empty());

    guest.set_script(GuestScript::default());
    handle.relaunch().await.expect("relaunch");

    wait_until("cancellations", || guest.responses().len() == 2).await;
    let responses = guest.responses();
    assert!(responses
        .iter()
        .all(|(_, value)| *value == InteractionValue::Cancelled));
    let mut cancelled_ids: Vec<String> =
        responses.iter().map(|(id, _)| id.to_string()).collect();
    cancelled_ids.sort();
    let mut expected: Vec<String> = expected_ids.drain(..).map(|id| id.to_string()).collect();
    expected.sort();
    assert_eq!(cancelled_ids, expected);

    handle
        .wait_for_state(SessionState::Ready)
        .await
        .expect("ready after relaunch");
    // No further responses once the new session is up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(guest.responses().len(), 2);
}

#[tokio::test]
async fn shutdown_cancels_pending_work_and_closes_the_handle() {
    let interaction = ScriptedInteraction::new(InteractionKind::Confirm);
    let id = interaction.id.clone();
    let guest = ScriptedGuest::new(GuestScript {
        interactions: vec![interaction],
        ..GuestScript::default()
    });
    let handle = launch(&guest, Arc::new(HangingPrompts)).await;
    handle.wait_for_state(SessionState::Ready).await.expect("ready");
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.shutdown().await.expect("shutdown");
    wait_until("cancellation", || !guest.responses().is_empty()).await;
    assert_eq!(guest.responses(), vec![(id, InteractionValue::Cancelled)]);

    let err = handle.execute("x = 1", None).await.unwrap_err();
    assert!(matches!(err, bridge_host::HostError::SessionClosed));
}
