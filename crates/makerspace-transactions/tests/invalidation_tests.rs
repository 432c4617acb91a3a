//! Tag invalidation between writes and cached reads

use anyhow::Result;
use makerspace_transactions::mock::{shared, MockOperation};
use makerspace_transactions::{
    ApiResult, InvalidationRegistry, ReadOptions, ReadTransaction, Tag, TransactionStore,
    WriteTransaction,
};

fn members_read_op() -> MockOperation<(), Vec<String>> {
    MockOperation::new("listMembers").with_default(ApiResult::ok(vec!["m1".to_string()]))
}

#[tokio::test]
async fn test_successful_write_refreshes_tagged_reads() -> Result<()> {
    let store = TransactionStore::new();
    let registry = InvalidationRegistry::new();
    let read_op = shared(members_read_op());

    let mut members = ReadTransaction::new(
        store.clone(),
        read_op.clone(),
        (),
        ReadOptions::default().with_tags([Tag::new("members")]),
    )?;
    members.register(&registry);
    members.mount().expect("call issued").await?;
    assert_eq!(read_op.calls(), 1);

    let write_op = shared(
        MockOperation::<String, ()>::new("deleteMember").with_default(ApiResult::ok(())),
    );
    let delete = WriteTransaction::new(write_op)
        .with_invalidation(registry.clone(), vec![Tag::new("members")]);

    delete.call("m1".to_string()).await;
    assert!(members.is_requesting());
    members.settled().await;
    assert_eq!(read_op.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_write_leaves_reads_alone() -> Result<()> {
    let store = TransactionStore::new();
    let registry = InvalidationRegistry::new();
    let read_op = shared(members_read_op());

    let mut members = ReadTransaction::new(
        store,
        read_op.clone(),
        (),
        ReadOptions::default().with_tags([Tag::new("members")]),
    )?;
    members.register(&registry);
    members.mount().expect("call issued").await?;

    let write_op = shared(MockOperation::<String, ()>::new("deleteMember"));
    write_op.respond(ApiResult::err("Member has open invoices"));
    let delete = WriteTransaction::new(write_op)
        .with_invalidation(registry.clone(), vec![Tag::new("members")]);

    delete.call("m1".to_string()).await;
    assert!(!members.is_requesting());
    assert_eq!(read_op.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropped_read_is_not_refreshed() -> Result<()> {
    let store = TransactionStore::new();
    let registry = InvalidationRegistry::new();
    let read_op = shared(members_read_op());

    let mut members = ReadTransaction::new(
        store,
        read_op.clone(),
        (),
        ReadOptions::default().with_tags([Tag::new("members")]),
    )?;
    members.register(&registry);
    members.mount().expect("call issued").await?;
    drop(members);

    assert_eq!(registry.invalidate(&[Tag::new("members")]), 0);
    assert_eq!(registry.live_registrations(), 0);
    assert_eq!(read_op.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unmounted_read_ignores_invalidation() -> Result<()> {
    let store = TransactionStore::new();
    let registry = InvalidationRegistry::new();
    let read_op = shared(members_read_op());

    let mut members = ReadTransaction::new(
        store,
        read_op.clone(),
        (),
        ReadOptions::default().with_tags([Tag::new("members")]),
    )?;
    members.register(&registry);

    assert_eq!(registry.invalidate(&[Tag::new("members")]), 0);
    assert_eq!(read_op.calls(), 0);
    assert!(!members.is_requesting());

    members.mount().expect("call issued").await?;
    assert_eq!(read_op.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_without_registry_reads_are_refreshed_by_hand() -> Result<()> {
    let store = TransactionStore::new();
    let read_op = shared(members_read_op());
    let mut members = ReadTransaction::new(store, read_op.clone(), (), ReadOptions::default())?;
    members.mount().expect("call issued").await?;

    let write_op = shared(
        MockOperation::<String, ()>::new("deleteMember").with_default(ApiResult::ok(())),
    );
    let delete = WriteTransaction::new(write_op);
    let result = delete.call("m1".to_string()).await;
    assert!(!members.is_requesting());

    if !result.is_error() {
        members.refresh().expect("idle refresh issues a call").await?;
    }
    assert_eq!(read_op.calls(), 2);
    Ok(())
}
