//! Billed script polishing tests.

mod common;

use common::{spawn_services, spawn_services_with};
use credit_service::error::CreditError;
use credit_service::models::{ConfigOwner, EntryKind, ServiceType};
use credit_service::services::polish::DEFAULT_POLISH_TEXT_MODEL;
use credit_service::services::providers::mock::{MockBehavior, MockClientFactory};
use credit_service::services::skills::FALLBACK_SKILL;

const USER: i64 = 12;

#[tokio::test]
async fn polish_charges_and_normalizes_output() {
    let ctx = spawn_services_with(MockClientFactory::new(MockBehavior::Respond(
        "```text\nPolished version: The rain kept falling.\n```".to_string(),
    )));
    ctx.seed_user(USER, 30).await;
    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro"], 8)
        .await;

    let polished = ctx
        .services
        .polisher
        .polish(USER, "  it rained  ", "", "unknown-skill", "script_polish")
        .await
        .unwrap();

    assert_eq!(polished.content, "The rain kept falling.");
    assert_eq!(polished.skill, FALLBACK_SKILL);
    assert_eq!(polished.model, "doubao-pro");
    assert_eq!(polished.credit_cost, 8);
    assert_eq!(ctx.balance(USER).await, 22);

    let page = ctx.services.ledger.list_entries(Some(USER), 1, 20).await.unwrap();
    let charge = &page.entries[0];
    assert_eq!(charge.kind, EntryKind::AiText);
    assert_eq!(
        charge.description.as_deref(),
        Some("script_polish:polish_master")
    );
}

#[tokio::test]
async fn empty_output_is_refunded() {
    let ctx = spawn_services_with(MockClientFactory::new(MockBehavior::Respond(
        "```\n```".to_string(),
    )));
    ctx.seed_user(USER, 30).await;
    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro"], 8)
        .await;

    let err = ctx
        .services
        .polisher
        .polish(USER, "draft", "", "", "episode_script_polish:3")
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::Provider(_)));
    assert_eq!(ctx.balance(USER).await, 30);
    assert_eq!(ctx.entry_sum(USER).await, 30);
}

#[tokio::test]
async fn empty_input_is_rejected_without_charge() {
    let ctx = spawn_services();
    ctx.seed_user(USER, 30).await;
    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro"], 8)
        .await;

    let err = ctx
        .services
        .polisher
        .polish(USER, "   ", "", "", "script_polish")
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::InvalidInput(_)));
    assert_eq!(ctx.balance(USER).await, 30);
    assert_eq!(ctx.clients.calls(), 0);
}

#[tokio::test]
async fn model_hint_resolution_order() {
    let ctx = spawn_services();
    let polisher = &ctx.services.polisher;

    assert_eq!(
        polisher.resolve_model_hint(" gpt-4o ").await.unwrap(),
        "gpt-4o"
    );
    assert_eq!(
        polisher.resolve_model_hint("").await.unwrap(),
        DEFAULT_POLISH_TEXT_MODEL
    );

    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro", "doubao-lite"], 2)
        .await;
    assert_eq!(polisher.resolve_model_hint("").await.unwrap(), "doubao-pro");
}

#[tokio::test]
async fn unavailable_platform_default_falls_back_to_own_config() {
    let ctx = spawn_services_with(
        MockClientFactory::new(MockBehavior::Respond("Better text.".to_string()))
            .with_unavailable_model("doubao-pro"),
    );
    ctx.seed_user(USER, 30).await;
    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro"], 8)
        .await;
    let own = ctx
        .add_config(ConfigOwner::User(USER), ServiceType::Text, &["my-llm"], 1, 0)
        .await;

    let polished = ctx
        .services
        .polisher
        .polish(USER, "draft", "", FALLBACK_SKILL, "script_polish")
        .await
        .unwrap();

    assert_eq!(polished.content, "Better text.");
    assert_eq!(polished.model, "my-llm");
    assert_eq!(polished.credit_cost, 8, "platform price still applies");
    assert_eq!(ctx.balance(USER).await, 22);
    assert_eq!(ctx.entry_sum(USER).await, 22);
    assert_eq!(ctx.clients.built(), vec![(own.config_id, "my-llm".to_string())]);
}

#[tokio::test]
async fn pinned_model_failure_is_surfaced() {
    let ctx = spawn_services_with(
        MockClientFactory::new(MockBehavior::Echo).with_unavailable_model("doubao-pro"),
    );
    ctx.seed_user(USER, 30).await;
    ctx.add_default_platform_config(ServiceType::Text, &["doubao-pro"], 8)
        .await;

    let err = ctx
        .services
        .polisher
        .polish(USER, "draft", "doubao-pro", "", "script_polish")
        .await
        .unwrap_err();

    assert!(matches!(err, CreditError::ClientUnavailable(_)));
    assert_eq!(ctx.balance(USER).await, 30);
}
