//! Credit ledger integration tests: consume, reserve, refund and listing.

mod common;

use common::spawn_services;
use credit_service::error::CreditError;
use credit_service::models::{EntryKind, ServiceType};
use credit_service::services::billing_detail;
use futures::future::join_all;

#[tokio::test]
async fn consume_until_empty_then_reject() {
    let ctx = spawn_services();
    ctx.seed_user(5, 10).await;
    let ledger = &ctx.services.ledger;

    ledger
        .consume(5, 10, EntryKind::GenerateFramePrompt, "x")
        .await
        .expect("first consume should succeed");
    assert_eq!(ctx.balance(5).await, 0);

    let err = ledger
        .consume(5, 1, EntryKind::GenerateFramePrompt, "x")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreditError::InsufficientCredits {
            required: 1,
            available: 0
        }
    ));
    assert_eq!(ctx.balance(5).await, 0);
    assert_eq!(ctx.entry_sum(5).await, 0);
}

#[tokio::test]
async fn non_positive_cost_is_a_no_op() {
    let ctx = spawn_services();
    ctx.seed_user(5, 3).await;

    ctx.services
        .ledger
        .consume(5, 0, EntryKind::GenerateImage, "free")
        .await
        .unwrap();
    let reference = ctx
        .services
        .ledger
        .reserve(5, ServiceType::Text, "gpt-4o", -4, "free")
        .await
        .unwrap();

    assert!(reference.is_none());
    assert_eq!(ctx.balance(5).await, 3);
    let page = ctx.services.ledger.list_entries(Some(5), 1, 20).await.unwrap();
    assert_eq!(page.total, 1, "only the opening balance entry");
}

#[tokio::test]
async fn consume_on_missing_account_is_not_found() {
    let ctx = spawn_services();
    let err = ctx
        .services
        .ledger
        .consume(404, 1, EntryKind::GenerateImage, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, CreditError::NotFound(_)));
}

#[tokio::test]
async fn fixed_cost_helpers_charge_configured_prices() {
    let ctx = spawn_services();
    ctx.seed_user(7, 100).await;
    let ledger = &ctx.services.ledger;

    ledger
        .consume_for_frame_prompt(7, &billing_detail("storyboard", 12))
        .await
        .unwrap();
    ledger
        .consume_for_image_generation(7, &billing_detail("image", 3))
        .await
        .unwrap();

    assert_eq!(ctx.balance(7).await, 100 - 10 - 5);

    let page = ledger.list_entries(Some(7), 1, 20).await.unwrap();
    let newest = &page.entries[0];
    assert_eq!(newest.kind, EntryKind::GenerateImage);
    assert_eq!(newest.amount, -5);
    assert_eq!(newest.description.as_deref(), Some("image:3"));
    assert_eq!(page.entries[1].kind, EntryKind::GenerateFramePrompt);
}

#[tokio::test]
async fn reserve_then_refund_restores_balance() {
    let ctx = spawn_services();
    ctx.seed_user(9, 50).await;
    let ledger = &ctx.services.ledger;

    let reference = ledger
        .reserve(9, ServiceType::Image, "dall-e-3", 20, "image:1")
        .await
        .unwrap()
        .expect("positive cost should produce a reference");
    assert_eq!(ctx.balance(9).await, 30);

    ledger.refund(&reference).await.unwrap();
    assert_eq!(ctx.balance(9).await, 50);
    assert_eq!(ctx.entry_sum(9).await, 50);

    let page = ledger.list_entries(Some(9), 1, 20).await.unwrap();
    let refund = &page.entries[0];
    let reserve = &page.entries[1];
    assert_eq!(refund.kind, EntryKind::AiImageRefund);
    assert_eq!(refund.amount, 20);
    assert_eq!(refund.reference_id.as_deref(), Some(reference.as_str()));
    assert_eq!(refund.model.as_deref(), Some("dall-e-3"));
    assert_eq!(refund.description.as_deref(), Some("refund: image:1"));
    assert_eq!(reserve.kind, EntryKind::AiImage);
    assert_eq!(reserve.service_type, Some(ServiceType::Image));
}

#[tokio::test]
async fn refund_of_long_detail_is_cut_to_column_width() {
    let ctx = spawn_services();
    ctx.seed_user(9, 50).await;
    let ledger = &ctx.services.ledger;
    let detail = "x".repeat(250);

    let reference = ledger
        .reserve(9, ServiceType::Text, "gpt-4o", 5, &detail)
        .await
        .unwrap()
        .expect("positive cost should produce a reference");
    ledger.refund(&reference).await.unwrap();

    assert_eq!(ctx.balance(9).await, 50);
    assert_eq!(ctx.entry_sum(9).await, 50);
    let page = ledger.list_entries(Some(9), 1, 20).await.unwrap();
    let refund = &page.entries[0];
    assert_eq!(refund.kind, EntryKind::AiTextRefund);
    let description = refund.description.as_deref().unwrap();
    assert!(description.starts_with("refund: xxx"));
    assert_eq!(description.chars().count(), 255);
    assert_eq!(page.entries[1].description.as_deref(), Some(detail.as_str()));
}

#[tokio::test]
async fn refund_is_idempotent() {
    let ctx = spawn_services();
    ctx.seed_user(9, 50).await;
    let ledger = &ctx.services.ledger;

    let reference = ledger
        .reserve(9, ServiceType::Text, "gpt-4o", 15, "chat")
        .await
        .unwrap()
        .unwrap();

    ledger.refund(&reference).await.unwrap();
    ledger.refund(&reference).await.unwrap();

    assert_eq!(ctx.balance(9).await, 50);
    let page = ledger.list_entries(Some(9), 1, 20).await.unwrap();
    assert_eq!(page.total, 3, "opening balance, reserve, one refund");
}

#[tokio::test]
async fn concurrent_refunds_credit_once() {
    let ctx = spawn_services();
    ctx.seed_user(9, 50).await;
    let ledger = ctx.services.ledger.clone();

    let reference = ledger
        .reserve(9, ServiceType::Video, "veo-2", 25, "video")
        .await
        .unwrap()
        .unwrap();

    let tasks = (0..5).map(|_| {
        let ledger = ledger.clone();
        let reference = reference.clone();
        tokio::spawn(async move { ledger.refund(&reference).await })
    });
    for result in join_all(tasks).await {
        result.expect("task panicked").expect("refund should succeed");
    }

    assert_eq!(ctx.balance(9).await, 50);
    assert_eq!(ctx.entry_sum(9).await, 50);
}

#[tokio::test]
async fn refund_of_unknown_or_empty_reference_is_a_no_op() {
    let ctx = spawn_services();
    ctx.seed_user(9, 50).await;

    ctx.services.ledger.refund("").await.unwrap();
    ctx.services
        .ledger
        .refund("00000000-0000-0000-0000-000000000000")
        .await
        .unwrap();

    assert_eq!(ctx.balance(9).await, 50);
}

#[tokio::test]
async fn reserve_beyond_balance_fails_and_leaves_balance() {
    let ctx = spawn_services();
    ctx.seed_user(3, 7).await;

    let err = ctx
        .services
        .ledger
        .reserve(3, ServiceType::Text, "gpt-4o", 8, "chat")
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::InsufficientCredits { .. }));
    assert_eq!(ctx.balance(3).await, 7);
}

#[tokio::test]
async fn concurrent_reserves_never_overdraw() {
    let ctx = spawn_services();
    ctx.seed_user(11, 10).await;
    let ledger = ctx.services.ledger.clone();

    let tasks = [6_i64, 7].into_iter().map(|cost| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .reserve(11, ServiceType::Text, "gpt-4o", cost, "race")
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(CreditError::InsufficientCredits { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(rejected, 1);

    let balance = ctx.balance(11).await;
    assert!(balance == 4 || balance == 3, "unexpected balance {}", balance);
    assert_eq!(ctx.entry_sum(11).await, balance);
}

#[tokio::test]
async fn balance_tracks_entry_sum_across_mixed_operations() {
    let ctx = spawn_services();
    ctx.seed_user(21, 40).await;
    let ledger = ctx.services.ledger.clone();

    let tasks = (0..12).map(|i| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            match i % 3 {
                0 => ledger
                    .consume(21, 3, EntryKind::GenerateImage, "img")
                    .await
                    .map(|_| ()),
                1 => {
                    let reference = ledger
                        .reserve(21, ServiceType::Text, "gpt-4o", 4, "txt")
                        .await?;
                    if let Some(reference) = reference {
                        ledger.refund(&reference).await?;
                    }
                    Ok(())
                }
                _ => ledger
                    .reserve(21, ServiceType::Image, "img-1", 2, "img")
                    .await
                    .map(|_| ()),
            }
        })
    });

    for result in join_all(tasks).await {
        match result.expect("task panicked") {
            Ok(()) | Err(CreditError::InsufficientCredits { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let balance = ctx.balance(21).await;
    assert!(balance >= 0);
    assert_eq!(ctx.entry_sum(21).await, balance);
}

#[tokio::test]
async fn list_entries_pages_newest_first_and_clamps() {
    let ctx = spawn_services();
    ctx.seed_user(1, 100).await;
    ctx.seed_user(2, 100).await;
    let ledger = &ctx.services.ledger;

    for i in 0..5 {
        ledger
            .consume(1, 1, EntryKind::GenerateImage, &format!("img:{}", i))
            .await
            .unwrap();
    }

    let page = ledger.list_entries(Some(1), 1, 2).await.unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].description.as_deref(), Some("img:4"));
    assert!(page.entries[0].entry_id > page.entries[1].entry_id);

    let clamped = ledger.list_entries(Some(1), 0, 0).await.unwrap();
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.page_size, 20);

    let everyone = ledger.list_entries(None, 1, 500).await.unwrap();
    assert_eq!(everyone.page_size, 100);
    assert_eq!(everyone.total, 7);
}
