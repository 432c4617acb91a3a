//! Integration tests for the write transaction controller

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use makerspace_transactions::mock::{shared, MockOperation};
use makerspace_transactions::{ApiResult, WriteState, WriteTransaction};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct UpdateMember {
    id: String,
    email: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: String,
    email: String,
}

fn update(id: &str, email: &str) -> UpdateMember {
    UpdateMember {
        id: id.to_string(),
        email: email.to_string(),
    }
}

fn update_member_op() -> MockOperation<UpdateMember, Member> {
    MockOperation::new("updateMember").with_handler(|args: &UpdateMember| {
        if args.email.contains('@') {
            ApiResult::ok(Member {
                id: args.id.clone(),
                email: args.email.clone(),
            })
        } else {
            ApiResult::err("Email is invalid")
        }
    })
}

#[tokio::test]
async fn test_call_records_success_and_returns_raw_result() -> Result<()> {
    let op = shared(update_member_op());
    let write = WriteTransaction::new(op.clone());
    assert_eq!(write.state(), WriteState::default());

    let result = write.call(update("m1", "ada@example.org")).await;
    assert_eq!(result.data().map(|m| m.email.as_str()), Some("ada@example.org"));

    let state = write.state();
    assert!(state.called);
    assert!(!state.is_requesting);
    assert_eq!(state.data.map(|m| m.id), Some("m1".to_string()));
    assert!(state.error.is_none());
    Ok(())
}

#[tokio::test]
async fn test_reset_after_failure() -> Result<()> {
    let op = shared(MockOperation::<UpdateMember, Member>::new("updateMember"));
    op.respond(ApiResult::err("X"));
    let write = WriteTransaction::new(op.clone());

    let result = write.call(update("m1", "ada@example.org")).await;
    assert!(result.is_error());
    assert_eq!(write.error().as_deref(), Some("X"));
    assert!(write.called());

    write.reset();
    assert_eq!(
        write.state(),
        WriteState {
            is_requesting: false,
            data: None,
            error: None,
            called: false,
        }
    );
    // no call was made by reset
    assert_eq!(op.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_handles_do_not_share_state() -> Result<()> {
    let op = shared(update_member_op().gated());
    let first = WriteTransaction::new(op.clone());
    let second = WriteTransaction::new(op.clone());

    let pending = first.spawn_call(update("m1", "ada@example.org"));
    assert!(first.is_requesting());
    assert!(!second.is_requesting());
    assert!(!second.called());

    op.release(2);
    pending.await?;
    let result = second.call(update("m1", "ada@example.org")).await;
    assert!(!result.is_error());

    // identical writes are never coalesced
    assert_eq!(op.calls(), 2);
    assert!(first.data().is_some());
    assert!(second.data().is_some());
    Ok(())
}

#[tokio::test]
async fn test_failure_keeps_previous_data() -> Result<()> {
    let op = shared(update_member_op());
    let write = WriteTransaction::new(op);

    write.call(update("m1", "ada@example.org")).await;
    write.call(update("m1", "not-an-email")).await;

    let state = write.state();
    assert_eq!(state.error.as_deref(), Some("Email is invalid"));
    assert_eq!(state.data.map(|m| m.email), Some("ada@example.org".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_chained_write_only_on_success() -> Result<()> {
    let update_op = shared(update_member_op());
    let notify_op = shared(
        MockOperation::<String, ()>::new("sendWelcomeEmail").with_default(ApiResult::ok(())),
    );
    let update_write = WriteTransaction::new(update_op);
    let notify_write = WriteTransaction::new(notify_op.clone());

    for email in ["broken", "grace@example.org"] {
        let result = update_write.call(update("m2", email)).await;
        if let Some(member) = result.data() {
            notify_write.call(member.email.clone()).await;
        }
    }

    assert_eq!(notify_op.received(), vec!["grace@example.org".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_on_settled_runs_for_every_outcome() -> Result<()> {
    let settled = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let write = WriteTransaction::new(shared(update_member_op())).with_on_settled({
        let settled = settled.clone();
        let failures = failures.clone();
        move |result: &ApiResult<Member>| {
            settled.fetch_add(1, Ordering::SeqCst);
            if result.is_error() {
                failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    write.call(update("m1", "ada@example.org")).await;
    write.call(update("m1", "nope")).await;

    assert_eq!(settled.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropped_handle_is_not_updated() -> Result<()> {
    let settled = Arc::new(AtomicUsize::new(0));
    let op = shared(update_member_op().gated());
    let write = WriteTransaction::new(op.clone()).with_on_settled({
        let settled = settled.clone();
        move |_: &ApiResult<Member>| {
            settled.fetch_add(1, Ordering::SeqCst);
        }
    });

    let pending = write.spawn_call(update("m3", "lin@example.org"));
    drop(write);
    op.release(1);

    // the call still completes and its result reaches the awaiting caller
    let result = pending.await?;
    assert_eq!(result.data().map(|m| m.id.as_str()), Some("m3"));
    assert_eq!(settled.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_call_leaves_flight() -> Result<()> {
    let op = shared(update_member_op().gated());
    let write = WriteTransaction::new(op.clone());

    let call = write.call(update("m4", "kay@example.org"));
    let timed_out = tokio::time::timeout(Duration::from_millis(10), call).await;
    assert!(timed_out.is_err());
    op.release(1);

    let state = write.state();
    assert!(!state.is_requesting);
    assert!(state.called);
    assert!(state.data.is_none());
    assert!(state.error.is_none());

    // the handle is still usable afterwards
    let result = write.call(update("m4", "kay@example.org")).await;
    assert!(!result.is_error());
    assert_eq!(write.data().map(|m| m.id), Some("m4".to_string()));
    Ok(())
}
