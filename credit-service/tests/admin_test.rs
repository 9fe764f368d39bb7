//! Admin mutation tests: recharge, status and role updates with audit.

mod common;

use common::{spawn_services, ADMIN_ID};
use credit_service::error::CreditError;
use credit_service::models::{
    ActorMeta, EntryKind, ListAuditFilter, NewAccount, UserRole, UserStatus, ACTION_RECHARGE,
    ACTION_UPDATE_ROLE, ACTION_UPDATE_STATUS, TARGET_USER,
};
use serde_json::json;

fn meta() -> ActorMeta {
    ActorMeta::new("10.0.0.8", "admin-console/2.1")
}

#[tokio::test]
async fn recharge_updates_balance_entry_and_audit_together() {
    let ctx = spawn_services();
    ctx.seed_user(5, 10).await;

    let (account, entry) = ctx
        .services
        .admin
        .recharge_credits(ADMIN_ID, 5, 30, "manual", &meta())
        .await
        .unwrap();

    assert_eq!(account.balance, 40);
    assert_eq!(ctx.balance(5).await, 40);
    assert_eq!(entry.amount, 30);
    assert_eq!(entry.kind, EntryKind::Recharge);
    assert_eq!(entry.description.as_deref(), Some("manual"));
    assert_eq!(ctx.entry_sum(5).await, 40);

    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 1);
    let record = &audit.records[0];
    assert_eq!(record.actor_id, ADMIN_ID);
    assert_eq!(record.action, ACTION_RECHARGE);
    assert_eq!(record.target_type, TARGET_USER);
    assert_eq!(record.target_id, "5");
    assert_eq!(record.before_json, Some(json!({"credits": 10})));
    assert_eq!(record.after_json, Some(json!({"credits": 40})));
    assert_eq!(record.ip.as_deref(), Some("10.0.0.8"));
    assert_eq!(record.user_agent.as_deref(), Some("admin-console/2.1"));
}

#[tokio::test]
async fn recharge_with_empty_note_uses_default_description() {
    let ctx = spawn_services();
    ctx.seed_user(5, 0).await;

    let (_, entry) = ctx
        .services
        .admin
        .recharge_credits(ADMIN_ID, 5, 12, "  ", &ActorMeta::default())
        .await
        .unwrap();
    assert_eq!(entry.description.as_deref(), Some("admin recharge"));

    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.records[0].ip, None);
    assert_eq!(audit.records[0].user_agent, None);
}

#[tokio::test]
async fn recharge_rejects_non_positive_amounts() {
    let ctx = spawn_services();
    ctx.seed_user(5, 10).await;

    for amount in [0, -5] {
        let err = ctx
            .services
            .admin
            .recharge_credits(ADMIN_ID, 5, amount, "oops", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, CreditError::InvalidAmount(a) if a == amount));
    }
    assert_eq!(ctx.balance(5).await, 10);
    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
}

#[tokio::test]
async fn recharge_that_would_overflow_the_balance_writes_nothing() {
    let ctx = spawn_services();
    ctx.seed_user(5, 10).await;

    let err = ctx
        .services
        .admin
        .recharge_credits(ADMIN_ID, 5, i64::MAX, "big", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidAmount(a) if a == i64::MAX));

    assert_eq!(ctx.balance(5).await, 10);
    assert_eq!(ctx.entry_sum(5).await, 10);
    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
}

#[tokio::test]
async fn recharge_note_longer_than_the_column_is_cut() {
    let ctx = spawn_services();
    ctx.seed_user(5, 10).await;
    let note = "é".repeat(300);

    let (account, entry) = ctx
        .services
        .admin
        .recharge_credits(ADMIN_ID, 5, 7, &note, &meta())
        .await
        .unwrap();
    assert_eq!(account.balance, 17);
    let description = entry.description.unwrap();
    assert_eq!(description.chars().count(), 255);
    assert!(note.starts_with(&description));
    assert_eq!(ctx.entry_sum(5).await, 17);
}

#[tokio::test]
async fn recharge_missing_account_writes_nothing() {
    let ctx = spawn_services();

    let err = ctx
        .services
        .admin
        .recharge_credits(ADMIN_ID, 77, 10, "manual", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::NotFound(_)));

    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
    let entries = ctx.services.ledger.list_entries(None, 1, 20).await.unwrap();
    assert_eq!(entries.total, 0);
}

#[tokio::test]
async fn status_update_is_audited() {
    let ctx = spawn_services();
    ctx.seed_user(8, 0).await;

    let account = ctx
        .services
        .admin
        .update_user_status(ADMIN_ID, 8, "disabled", &meta())
        .await
        .unwrap();
    assert_eq!(account.status, UserStatus::Disabled);
    assert!(!ctx.services.ledger.account(8).await.unwrap().is_active());

    let filter = ListAuditFilter {
        action: Some(ACTION_UPDATE_STATUS.to_string()),
        ..Default::default()
    };
    let audit = ctx.services.audit.list_records(&filter, 1, 20).await.unwrap();
    assert_eq!(audit.total, 1);
    assert_eq!(audit.records[0].before_json, Some(json!({"status": "active"})));
    assert_eq!(audit.records[0].after_json, Some(json!({"status": "disabled"})));
}

#[tokio::test]
async fn status_update_on_missing_user_is_not_found_without_audit() {
    let ctx = spawn_services();

    let err = ctx
        .services
        .admin
        .update_user_status(ADMIN_ID, 404, "disabled", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::NotFound(_)));

    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
}

#[tokio::test]
async fn invalid_status_and_role_are_rejected_before_any_write() {
    let ctx = spawn_services();
    ctx.seed_user(8, 0).await;

    let err = ctx
        .services
        .admin
        .update_user_status(ADMIN_ID, 8, "banned", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidStatus(ref s) if s == "banned"));

    let err = ctx
        .services
        .admin
        .update_user_role(ADMIN_ID, 8, "superuser", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidRole(ref r) if r == "superuser"));

    // Stored values are lowercase and matched exactly.
    let err = ctx
        .services
        .admin
        .update_user_status(ADMIN_ID, 8, "DISABLED", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidStatus(ref s) if s == "DISABLED"));

    let err = ctx
        .services
        .admin
        .update_user_role(ADMIN_ID, 8, " Admin ", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidRole(ref r) if r == " Admin "));

    // Validation happens before the account lookup.
    let err = ctx
        .services
        .admin
        .update_user_role(ADMIN_ID, 404, "root", &meta())
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::InvalidRole(_)));

    let account = ctx.services.ledger.account(8).await.unwrap();
    assert_eq!(account.status, UserStatus::Active);
    assert_eq!(account.role, UserRole::User);
    let audit = ctx
        .services
        .audit
        .list_records(&ListAuditFilter::default(), 1, 20)
        .await
        .unwrap();
    assert_eq!(audit.total, 0);
}

#[tokio::test]
async fn role_update_is_audited() {
    let ctx = spawn_services();
    ctx.seed_user(8, 0).await;

    let account = ctx
        .services
        .admin
        .update_user_role(ADMIN_ID, 8, "platform_admin", &meta())
        .await
        .unwrap();
    assert_eq!(account.role, UserRole::PlatformAdmin);
    assert!(account.role.is_admin());

    let filter = ListAuditFilter {
        action: Some(ACTION_UPDATE_ROLE.to_string()),
        target_id: Some("8".to_string()),
        ..Default::default()
    };
    let audit = ctx.services.audit.list_records(&filter, 1, 20).await.unwrap();
    assert_eq!(audit.total, 1);
    assert_eq!(audit.records[0].before_json, Some(json!({"role": "user"})));
    assert_eq!(
        audit.records[0].after_json,
        Some(json!({"role": "platform_admin"}))
    );
}

#[tokio::test]
async fn open_and_list_accounts() {
    let ctx = spawn_services();
    let admin = &ctx.services.admin;

    let opened = admin
        .open_account(&NewAccount {
            user_id: 30,
            role: UserRole::Vip,
            status: UserStatus::Active,
        })
        .await
        .unwrap();
    assert_eq!(opened.balance, 0);
    admin.open_account(&NewAccount::user(31)).await.unwrap();

    assert!(admin.open_account(&NewAccount::user(31)).await.is_err());

    let page = admin.list_accounts(1, 1).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.accounts.len(), 1);
}
