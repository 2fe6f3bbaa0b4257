use super::*;
use crate::{config::RegistryConfig, test_support::*};
use shared::{
    error::ApiError,
    protocol::{AccountRequest, AccountResponse, AuthorizationRecord},
};

fn registry(sender: Arc<ScriptedSender>) -> Arc<Authorizations> {
    Authorizations::new(sender, RegistryConfig::default())
}

fn entries(records: &[AuthorizationRecord]) -> Vec<Entry> {
    let now = RegistryConfig::default().now();
    records
        .iter()
        .map(|record| Entry::parse(record, None, now))
        .collect()
}

fn hashes(list: &[Entry]) -> Vec<SessionHash> {
    list.iter().map(|entry| entry.hash).collect()
}

/// Reloads and waits for the list to change.
async fn load(registry: &Arc<Authorizations>) {
    let mut changes = Box::pin(registry.list_changes());
    next_item(&mut changes).await;
    assert!(registry.reload());
    next_item(&mut changes).await;
}

#[test]
fn view_is_none_before_anything_loaded() {
    assert_eq!(SessionsView::from_list(&[]), None);
}

#[test]
fn view_groups_and_orders_by_last_activity() {
    let list = entries(&[
        record(10, 1_000),
        incomplete_record(30),
        current_record(1),
        record(11, 3_000),
        AuthorizationRecord {
            password_pending: true,
            ..record(31, 2_000)
        },
        record(12, 2_000),
    ]);

    let view = SessionsView::from_list(&list).expect("loaded");
    assert_eq!(
        view.current.as_ref().map(|entry| entry.hash),
        Some(SessionHash::CURRENT)
    );
    assert_eq!(
        hashes(&view.list),
        vec![SessionHash(11), SessionHash(12), SessionHash(10)]
    );
    assert_eq!(hashes(&view.incomplete), vec![SessionHash(30), SessionHash(31)]);
    assert_eq!(view.others_count(), 3);
}

#[test]
fn view_without_current_session_still_lists_others() {
    let view = SessionsView::from_list(&entries(&[record(10, 1_000)])).expect("loaded");
    assert!(view.current.is_none());
    assert_eq!(view.others_count(), 1);
}

#[test]
fn remove_drops_the_hash_from_both_groups() {
    let list = entries(&[
        current_record(1),
        record(10, 1_000),
        record(11, 2_000),
        incomplete_record(30),
    ]);
    let mut view = SessionsView::from_list(&list).expect("loaded");

    view.remove(SessionHash(10));
    view.remove(SessionHash(30));
    view.remove(SessionHash(999));

    assert_eq!(hashes(&view.list), vec![SessionHash(11)]);
    assert!(view.incomplete.is_empty());
    assert!(view.current.is_some());
}

#[tokio::test]
async fn poller_loads_immediately_and_again_once_stale() {
    let sender = ScriptedSender::new();
    sender.reply(authorizations(vec![current_record(1), record(10, 500)]));
    sender.reply(authorizations(vec![current_record(1), record(20, 600)]));
    let registry = registry(sender.clone());

    let poller = ShortPoller::start(Arc::clone(&registry), Duration::from_millis(50));

    wait_until(|| sender.call_count() >= 2).await;
    wait_until(|| hashes(&registry.list()).contains(&SessionHash(20))).await;
    assert!(sender
        .calls()
        .iter()
        .all(|call| *call == AccountRequest::GetAuthorizations));
    poller.stop();
}

#[tokio::test]
async fn poller_leaves_a_fresh_list_alone() {
    let sender = ScriptedSender::new();
    sender.reply(authorizations(vec![current_record(1)]));
    let registry = registry(sender.clone());
    load(&registry).await;

    let poller = ShortPoller::start(Arc::clone(&registry), Duration::from_secs(30));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sender.call_count(), 1);
    poller.stop();
}

#[tokio::test]
async fn dropping_the_poller_stops_reloads() {
    let sender = ScriptedSender::new();
    let registry = registry(sender.clone());

    let poller = ShortPoller::start(Arc::clone(&registry), Duration::from_millis(20));
    wait_until(|| sender.call_count() >= 1).await;
    drop(poller);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let calls = sender.call_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sender.call_count(), calls);
}

#[tokio::test]
async fn terminate_all_clears_then_reloads() {
    let sender = ScriptedSender::new();
    sender.reply(authorizations(vec![
        current_record(1),
        record(10, 500),
        record(20, 600),
    ]));
    let registry = registry(sender.clone());
    load(&registry).await;
    assert_eq!(registry.total(), 2);

    sender.reply(AccountResponse::Bool(true));
    sender.reply(authorizations(vec![current_record(1)]));
    let mut changes = Box::pin(registry.list_changes());
    next_item(&mut changes).await;

    let result = within(terminate_all_and_reload(&registry)).await;
    assert!(matches!(result, Ok(true)));
    assert!(next_item(&mut changes).await.is_empty());
    assert_eq!(
        hashes(&next_item(&mut changes).await),
        vec![SessionHash::CURRENT]
    );
    assert_eq!(registry.total(), 0);
    assert_eq!(
        sender.calls(),
        vec![
            AccountRequest::GetAuthorizations,
            AccountRequest::ResetAuthorizations,
            AccountRequest::GetAuthorizations,
        ]
    );
}

#[tokio::test]
async fn terminate_all_reloads_even_when_rejected() {
    let sender = ScriptedSender::new();
    sender.reply(authorizations(vec![current_record(1), record(10, 500)]));
    let registry = registry(sender.clone());
    load(&registry).await;

    sender.fail(RpcError::Server(ApiError::internal("boom")));
    sender.reply(authorizations(vec![current_record(1), record(10, 700)]));

    let result = within(terminate_all_and_reload(&registry)).await;
    let error = result.err().expect("termination should fail");
    assert_eq!(error.api_error(), Some(&ApiError::internal("boom")));

    wait_until(|| sender.call_count() == 3 && !registry.is_loading()).await;
    assert_eq!(
        hashes(&registry.list()),
        vec![SessionHash::CURRENT, SessionHash(10)]
    );
    assert_eq!(registry.list()[1].active_time, 700);
}
