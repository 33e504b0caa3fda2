mod common;

use std::sync::atomic::Ordering;

use common::{harness, harness_with, identity, settings, ADMIN_ID};
use storefront_bot::bot::ui_builder::{admin_prompt, AdminSummary};
use storefront_bot::bot::{EngineSettings, EventKind, InboundEvent};
use storefront_bot::dialogue::{FlowVariant, Gender, Stage};
use storefront_bot::errors::ConversationError;
use storefront_bot::localization::{t_args_lang, t_lang};
use storefront_bot::model::{OrderStatus, UserIdentity};
use storefront_bot::payments::{
    InvoicePayload, PayerInfo, PaymentConfirmedEvent, PreCheckoutDecision, PreCheckoutEvent,
};
use storefront_bot::store::{CartStore, CatalogStore};

const USER: i64 = 42;

fn en(key: &str) -> String {
    t_lang(key, Some("en"))
}

fn payment(user_id: i64, payload: &str, total_amount: u32, charge_id: &str) -> PaymentConfirmedEvent {
    PaymentConfirmedEvent {
        user: identity(user_id),
        chat_id: user_id,
        payload: payload.to_string(),
        total_amount,
        currency: "RUB".to_string(),
        provider_charge_id: charge_id.to_string(),
        payer: PayerInfo {
            email: Some("alex@example.com".into()),
            ..Default::default()
        },
        language_code: Some("en".into()),
    }
}

#[tokio::test]
async fn test_full_registration_flow() {
    let h = harness();

    h.text(USER, "/start", 1).await;
    assert_eq!(h.user(USER).await.stage, Stage::GenderSelection);
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains("Alex"));
    assert_eq!(prompt.callback_data(), vec!["gender_male", "gender_female"]);

    h.press(USER, "gender_female").await;
    assert_eq!(h.user(USER).await.stage, Stage::NameInput);
    assert_eq!(h.gateway.last_prompt().text, en("name-prompt"));

    h.text(USER, "  Alexandra  ", 2).await;
    assert_eq!(h.user(USER).await.stage, Stage::PhoneInput);

    h.text(USER, "89117929394", 3).await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::PhoneConfirmation);
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains("Alexandra"));
    assert!(prompt.text.contains("89117929394"));
    assert!(prompt.callback_data().contains(&"confirm_registration"));

    h.press(USER, "confirm_registration").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::Registered);
    assert_eq!(profile.gender, Gender::Female);
    assert_eq!(profile.name.as_deref(), Some("Alexandra"));
    assert_eq!(profile.phone.as_deref(), Some("89117929394"));

    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains("Alexandra"));
    assert!(prompt.text.contains("https://example.com/guide"));
    assert!(prompt.callback_data().contains(&"catalog"));
}

#[tokio::test]
async fn test_name_only_registration_skips_phone() {
    let h = harness_with(EngineSettings {
        flow_variant: FlowVariant::NameOnly,
        ..settings()
    });

    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;
    h.text(USER, "Alex", 2).await;
    assert_eq!(h.user(USER).await.stage, Stage::Confirmation);

    h.press(USER, "edit_registration").await;
    let choices = h.gateway.last_prompt().callback_data().join(",");
    assert!(choices.contains("edit_field_name"));
    assert!(!choices.contains("edit_field_phone"));

    h.press(USER, "back_to_confirmation").await;
    h.press(USER, "confirm_registration").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::Registered);
    assert_eq!(profile.phone, None);
}

#[tokio::test]
async fn test_every_prompt_replaces_the_previous_one() {
    let h = harness();

    h.text(USER, "/start", 1).await;
    let welcome_id = h.gateway.last_message_id();
    h.press(USER, "gender_male").await;
    let name_prompt_id = h.gateway.last_message_id();
    h.text(USER, "Alex", 2).await;

    let attempts = h.gateway.delete_attempts();
    // User messages and each superseded bot message, pressed message deleted once
    assert_eq!(
        attempts,
        vec![(USER, 1), (USER, welcome_id), (USER, 2), (USER, name_prompt_id)]
    );
    assert_eq!(h.user(USER).await.last_message_id, Some(h.gateway.last_message_id()));
}

#[tokio::test]
async fn test_invalid_phone_keeps_stage_and_warns() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;
    h.text(USER, "Alex", 2).await;

    for (i, bad) in ["12345", "phone please", "+89117929394"].iter().enumerate() {
        let message_id = 10 + i as i32;
        h.text(USER, bad, message_id).await;

        assert_eq!(h.user(USER).await.stage, Stage::PhoneInput);
        let prompt = h.gateway.last_prompt();
        assert!(prompt.text.starts_with(&en("phone-invalid")));
        assert!(prompt.text.contains(&en("phone-prompt")));
        assert!(h.gateway.delete_attempts().contains(&(USER, message_id)));
    }
    assert_eq!(h.user(USER).await.phone, None);

    h.text(USER, "+7 (911) 792-93-94", 20).await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::PhoneConfirmation);
    assert_eq!(profile.phone.as_deref(), Some("+7 (911) 792-93-94"));
}

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;
    h.text(USER, "   ", 2).await;

    assert_eq!(h.user(USER).await.stage, Stage::NameInput);
    assert!(h.gateway.last_prompt().text.starts_with(&en("name-invalid")));

    h.text(USER, &"x".repeat(101), 3).await;
    assert_eq!(h.user(USER).await.stage, Stage::NameInput);
    assert!(h.gateway.last_prompt().text.starts_with(&en("name-too-long")));
}

#[tokio::test]
async fn test_text_on_confirmation_keeps_user_message() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;
    h.text(USER, "Alex", 2).await;
    h.text(USER, "+79117929394", 3).await;

    h.text(USER, "looks good", 4).await;

    assert_eq!(h.user(USER).await.stage, Stage::PhoneConfirmation);
    assert!(!h.gateway.delete_attempts().contains(&(USER, 4)));
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.starts_with(&en("use-buttons-notice")));
    assert!(prompt.callback_data().contains(&"confirm_registration"));
}

#[tokio::test]
async fn test_text_on_gender_step_asks_for_buttons() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.text(USER, "male", 2).await;

    assert_eq!(h.user(USER).await.stage, Stage::GenderSelection);
    assert!(h.gateway.delete_attempts().contains(&(USER, 2)));
    assert!(h.gateway.last_prompt().text.starts_with(&en("use-buttons-notice")));
}

#[tokio::test]
async fn test_fix_phone_from_confirmation() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;
    h.text(USER, "Alex", 2).await;
    h.text(USER, "+79117929394", 3).await;

    h.press(USER, "edit_registration").await;
    assert_eq!(h.user(USER).await.stage, Stage::PhoneConfirmation);
    h.press(USER, "edit_field_phone").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditPhone);

    h.text(USER, "79110000000", 4).await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::PhoneConfirmation);
    assert_eq!(profile.phone.as_deref(), Some("79110000000"));
    assert!(h.gateway.last_prompt().text.contains("79110000000"));
}

#[tokio::test]
async fn test_stale_gender_button_rerenders_current_step() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "gender_male").await;

    h.press(USER, "gender_female").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::NameInput);
    assert_eq!(profile.gender, Gender::Male);
}

#[tokio::test]
async fn test_menu_before_registration_is_refused() {
    let h = harness();
    h.text(USER, "/start", 1).await;
    h.press(USER, "catalog").await;

    assert_eq!(h.user(USER).await.stage, Stage::GenderSelection);
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.starts_with(&en("finish-registration-first")));
    assert!(prompt.callback_data().contains(&"gender_male"));
}

#[tokio::test]
async fn test_unsupported_message_rerenders_stage() {
    let h = harness();
    h.register(USER).await;

    let event = InboundEvent {
        user: identity(USER),
        chat_id: USER,
        kind: EventKind::Unsupported,
        source_message_id: Some(77),
        language_code: Some("en".into()),
    };
    h.engine.handle(event).await.unwrap();

    assert!(h.gateway.delete_attempts().contains(&(USER, 77)));
    assert!(h.gateway.last_prompt().text.starts_with(&en("unsupported-message")));
    assert_eq!(h.user(USER).await.stage, Stage::Registered);
}

#[tokio::test]
async fn test_profile_edit_with_keep_current() {
    let h = harness();
    h.register(USER).await;

    h.press(USER, "edit_profile").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileGender);

    h.press(USER, "keep_current").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileName);

    h.text(USER, "Sam", 10).await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfilePhone);

    h.press(USER, "keep_current").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileConfirmation);

    h.press(USER, "confirm_registration").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::Registered);
    assert_eq!(profile.name.as_deref(), Some("Sam"));
    assert_eq!(profile.phone.as_deref(), Some("+79117929394"));
    assert!(h.gateway.last_prompt().text.starts_with(&en("profile-updated")));
}

#[tokio::test]
async fn test_profile_edit_changes_phone_only() {
    let h = harness();
    h.register(USER).await;

    h.press(USER, "edit_profile").await;
    h.press(USER, "keep_current").await;
    h.press(USER, "keep_current").await;
    h.text(USER, "8 921 000 11 22", 10).await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileConfirmation);

    h.press(USER, "confirm_registration").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::Registered);
    assert_eq!(profile.gender, Gender::Male);
    assert_eq!(profile.name.as_deref(), Some("Alex"));
    assert_eq!(profile.phone.as_deref(), Some("8 921 000 11 22"));
}

#[tokio::test]
async fn test_fixing_fields_from_edit_confirmation() {
    let h = harness();
    h.register(USER).await;

    h.press(USER, "edit_profile").await;
    for _ in 0..3 {
        h.press(USER, "keep_current").await;
    }
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileConfirmation);

    h.press(USER, "edit_registration").await;
    h.press(USER, "edit_field_name").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileFixName);
    h.text(USER, "Sam", 10).await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileConfirmation);

    h.press(USER, "edit_registration").await;
    h.press(USER, "edit_field_phone").await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileFixPhone);
    h.text(USER, "12345", 11).await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileFixPhone);
    h.text(USER, "89219990000", 12).await;
    assert_eq!(h.user(USER).await.stage, Stage::EditProfileConfirmation);
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains("Sam"));
    assert!(prompt.text.contains("89219990000"));

    h.press(USER, "confirm_registration").await;
    let profile = h.user(USER).await;
    assert_eq!(profile.stage, Stage::Registered);
    assert_eq!(profile.gender, Gender::Male);
    assert_eq!(profile.name.as_deref(), Some("Sam"));
    assert_eq!(profile.phone.as_deref(), Some("89219990000"));
}

#[tokio::test]
async fn test_cancel_profile_edit_returns_to_menu() {
    let h = harness();
    h.register(USER).await;

    h.press(USER, "edit_profile").await;
    h.press(USER, "cancel_edit").await;

    assert_eq!(h.user(USER).await.stage, Stage::Registered);
    assert_eq!(h.gateway.last_prompt().text, en("main-menu-title"));
}

#[tokio::test]
async fn test_start_after_registration_shows_menu() {
    let h = harness();
    h.register(USER).await;
    h.text(USER, "/start", 20).await;

    assert_eq!(h.user(USER).await.stage, Stage::Registered);
    assert_eq!(h.gateway.last_prompt().text, en("main-menu-title"));
}

#[tokio::test]
async fn test_adding_same_product_merges_lines() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;

    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, &format!("add_{}", tea.id)).await;

    let cart = h.carts.get_cart(USER).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total(), 200);

    let added = t_args_lang("added-to-cart", &[("name", "Tea")], Some("en"));
    assert!(h.gateway.last_prompt().text.starts_with(&added));
}

#[tokio::test]
async fn test_add_command_and_unknown_product() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;

    h.text(USER, &format!("/add {}", tea.id), 10).await;
    assert_eq!(h.carts.get_cart(USER).await.unwrap().items.len(), 1);

    h.text(USER, "/add tea", 11).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("add-usage")));

    h.press(USER, "add_999").await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("product-not-found")));
    assert_eq!(h.carts.get_cart(USER).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn test_checkout_creates_pending_order_and_empties_cart() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;
    let cake = h.product("Cake", 50).await;

    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, &format!("add_{}", cake.id)).await;
    h.press(USER, "checkout").await;

    let orders = h.store.list_orders_by_user(USER).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total_amount, 250);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[0].items.len(), 2);
    assert!(h.carts.get_cart(USER).await.unwrap().is_empty());

    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains(&format!("#{}", orders[0].id)));
    // No payment provider configured
    assert!(!prompt.callback_data().iter().any(|data| data.starts_with("pay_")));
}

#[tokio::test]
async fn test_checkout_with_empty_cart_creates_nothing() {
    let h = harness();
    h.register(USER).await;
    h.press(USER, "checkout").await;

    assert!(h.store.list_orders().await.unwrap().is_empty());
    assert!(h.gateway.last_prompt().text.contains(&en("cart-empty")));
}

#[tokio::test]
async fn test_clear_and_remove_cart_items() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;
    let cake = h.product("Cake", 50).await;

    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, &format!("add_{}", cake.id)).await;
    h.press(USER, &format!("remove_{}", tea.id)).await;
    let cart = h.carts.get_cart(USER).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_id, cake.id);

    h.press(USER, "clear_cart").await;
    assert!(h.carts.get_cart(USER).await.unwrap().is_empty());
    assert!(h.gateway.last_prompt().text.starts_with(&en("cart-cleared")));
}

#[tokio::test]
async fn test_buy_without_provider_explains() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;

    h.press(USER, &format!("buy_{}", tea.id)).await;
    assert!(h.gateway.invoices().is_empty());
    assert!(h.gateway.last_prompt().text.starts_with(&en("payments-unavailable")));
}

#[tokio::test]
async fn test_buy_sends_invoice_in_minor_units() {
    let h = harness_with(EngineSettings {
        payments_enabled: true,
        ..settings()
    });
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;

    h.press(USER, &format!("buy_{}", tea.id)).await;

    let invoices = h.gateway.invoices();
    assert_eq!(invoices.len(), 1);
    let (chat_id, invoice) = &invoices[0];
    assert_eq!(*chat_id, USER);
    assert_eq!(invoice.payload, InvoicePayload::Product(tea.id));
    assert_eq!(invoice.amount_minor, 10_000);
    assert_eq!(invoice.currency, "RUB");
}

#[tokio::test]
async fn test_pay_foreign_order_is_refused() {
    let h = harness_with(EngineSettings {
        payments_enabled: true,
        ..settings()
    });
    let tea = h.product("Tea", 100).await;
    h.register(7).await;
    h.press(7, &format!("add_{}", tea.id)).await;
    h.press(7, "checkout").await;
    let order_id = h.store.list_orders_by_user(7).await.unwrap()[0].id;

    h.register(USER).await;
    h.press(USER, &format!("pay_{order_id}")).await;

    assert!(h.gateway.invoices().is_empty());
    assert!(h.gateway.last_prompt().text.starts_with(&en("order-not-payable")));
}

#[tokio::test]
async fn test_payment_for_product_creates_paid_order() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;

    let order = h
        .engine
        .payment_confirmed(payment(USER, &format!("product_{}", tea.id), 10_000, "charge-1"))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_amount, 100);
    assert_eq!(order.payment_reference.as_deref(), Some("charge-1"));
    let prompt = h.gateway.last_prompt();
    assert!(prompt.text.contains(&format!("#{}", order.id)));
    assert!(prompt.text.contains("alex@example.com"));
}

#[tokio::test]
async fn test_payment_for_missing_product_creates_no_order() {
    let h = harness();
    h.register(USER).await;

    let result = h
        .engine
        .payment_confirmed(payment(USER, "product_999", 10_000, "charge-1"))
        .await;

    assert!(matches!(result, Err(ConversationError::NotFound(_))));
    assert!(h.store.list_orders().await.unwrap().is_empty());
    assert!(h.gateway.last_prompt().text.contains(&en("product-not-found")));
}

#[tokio::test]
async fn test_payment_for_pending_order_is_idempotent() {
    let h = harness();
    h.register(USER).await;
    let tea = h.product("Tea", 100).await;
    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, "checkout").await;
    let order_id = h.store.list_orders_by_user(USER).await.unwrap()[0].id;

    let event = payment(USER, &format!("order_{order_id}"), 10_000, "charge-7");
    let paid = h.engine.payment_confirmed(event.clone()).await.unwrap();
    assert_eq!(paid.id, order_id);
    assert_eq!(paid.status, OrderStatus::Paid);

    let replay = h.engine.payment_confirmed(event).await.unwrap();
    assert_eq!(replay.id, order_id);
    assert_eq!(h.store.list_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreadable_payment_payload() {
    let h = harness();
    h.register(USER).await;

    let result = h
        .engine
        .payment_confirmed(payment(USER, "gift_card", 100, "charge-1"))
        .await;
    assert!(matches!(result, Err(ConversationError::Payment(_))));
    assert!(h.gateway.last_prompt().text.contains(&en("error-generic")));
}

#[tokio::test]
async fn test_pre_checkout_decisions() {
    let h = harness();
    let tea = h.product("Tea", 100).await;
    h.register(USER).await;
    h.press(USER, &format!("add_{}", tea.id)).await;
    h.press(USER, "checkout").await;
    let order_id = h.store.list_orders_by_user(USER).await.unwrap()[0].id;

    let query = |user_id: i64, payload: String| PreCheckoutEvent {
        user_id,
        payload,
        total_amount: 10_000,
        currency: "RUB".into(),
        language_code: Some("en".into()),
    };

    assert_eq!(
        h.engine.pre_checkout(&query(USER, format!("product_{}", tea.id))).await,
        PreCheckoutDecision::Accept
    );
    assert_eq!(
        h.engine.pre_checkout(&query(USER, format!("order_{order_id}"))).await,
        PreCheckoutDecision::Accept
    );
    assert_eq!(
        h.engine.pre_checkout(&query(USER, "product_999".into())).await,
        PreCheckoutDecision::Reject(en("precheckout-product-missing"))
    );
    assert_eq!(
        h.engine.pre_checkout(&query(7, format!("order_{order_id}"))).await,
        PreCheckoutDecision::Reject(en("precheckout-order-invalid"))
    );
    assert_eq!(
        h.engine.pre_checkout(&query(USER, "whatever".into())).await,
        PreCheckoutDecision::Reject(en("precheckout-error"))
    );
}

#[tokio::test]
async fn test_admin_commands_are_refused_for_users() {
    let h = harness();
    h.register(USER).await;

    h.text(USER, "/admin", 10).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("admin-denied")));

    h.text(USER, "/broadcast Sale | Everything -20%", 11).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("admin-denied")));
    assert!(h.store.list_notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_stats_and_broadcast() {
    let h = harness();
    h.register(USER).await;
    h.register(ADMIN_ID).await;

    h.text(ADMIN_ID, "/admin", 10).await;
    let summary = AdminSummary {
        users: 2,
        registered: 2,
        ..Default::default()
    };
    assert_eq!(h.gateway.last_prompt(), admin_prompt(&summary, "RUB", Some("en")));

    h.text(ADMIN_ID, "/broadcast Sale | Everything -20%", 11).await;
    let notifications = h.store.list_notifications().await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Sale");
    assert_eq!(notifications[0].message, "Everything -20%");
    assert!(!notifications[0].is_sent);

    h.text(ADMIN_ID, "/broadcast missing separator", 12).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("broadcast-usage")));
    assert_eq!(h.store.list_notifications().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_meeting_and_offer_announcements() {
    let h = harness();
    h.register(ADMIN_ID).await;

    h.text(ADMIN_ID, "/meeting", 10).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("meeting-usage")));
    h.text(ADMIN_ID, "/meeting Q&A | Live session", 11).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("meeting-too-few")));
    h.text(ADMIN_ID, "/offer Spring sale", 12).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("offer-too-few")));
    assert!(h.store.list_notifications().await.unwrap().is_empty());

    h.text(ADMIN_ID, "/meeting Q&A | Live session | Friday 19:00 | https://meet.example", 13).await;
    h.text(ADMIN_ID, "/offer Spring sale | All courses | 20%", 14).await;

    let notifications = h.store.list_notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    let meeting = notifications.iter().find(|n| n.title.contains("Q&A")).unwrap();
    assert!(meeting.message.contains("Live session"));
    assert!(meeting.message.contains("Friday 19:00"));
    assert!(meeting.message.contains("https://meet.example"));
    let offer = notifications.iter().find(|n| n.title.contains("Spring sale")).unwrap();
    assert!(offer.message.contains("All courses"));
    assert!(offer.message.contains("20%"));
    assert!(notifications.iter().all(|n| !n.is_sent));
}

#[tokio::test]
async fn test_admin_users_list() {
    let h = harness();
    h.register(USER).await;
    h.register(ADMIN_ID).await;

    h.text(USER, "/users", 10).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("admin-denied")));
    h.text(USER, "/meeting Q&A | Live session | Friday", 11).await;
    assert!(h.gateway.last_prompt().text.starts_with(&en("admin-denied")));
    assert!(h.store.list_notifications().await.unwrap().is_empty());

    h.text(ADMIN_ID, "/users", 10).await;
    let listing = h.gateway.last_prompt();
    assert!(listing.text.contains(&USER.to_string()));
    assert!(listing.text.contains(&ADMIN_ID.to_string()));
    assert!(listing.text.contains("+79117929394"));

    h.text(ADMIN_ID, "/admin", 11).await;
    assert!(h.gateway.last_prompt().callback_data().contains(&"admin_users"));
    h.press(ADMIN_ID, "admin_users").await;
    assert_eq!(h.gateway.last_prompt(), listing);
}

#[tokio::test]
async fn test_failed_delete_is_not_retried() {
    let h = harness();
    h.register(USER).await;
    h.gateway.fail_deletes.store(true, Ordering::SeqCst);

    h.text(USER, "hello", 30).await;
    h.text(USER, "hello", 30).await;

    let attempts = h
        .gateway
        .delete_attempts()
        .into_iter()
        .filter(|attempt| *attempt == (USER, 30))
        .count();
    assert_eq!(attempts, 1);
    // Both turns still answered
    assert_eq!(h.gateway.last_prompt().text, en("main-menu-title"));
}

#[tokio::test]
async fn test_undeliverable_prompt_is_an_error() {
    let h = harness();
    h.gateway.fail_chat(USER);

    let event = InboundEvent::text(UserIdentity::new(USER), USER, "/start", 1);
    let result = h.engine.handle(event).await;

    assert!(matches!(result, Err(ConversationError::Delivery(_))));
    assert_eq!(h.user(USER).await.last_message_id, None);
}

#[tokio::test]
async fn test_users_do_not_share_state() {
    let h = harness();
    h.text(1, "/start", 1).await;
    h.text(2, "/start", 1).await;
    h.press(1, "gender_male").await;

    assert_eq!(h.user(1).await.stage, Stage::NameInput);
    assert_eq!(h.user(2).await.stage, Stage::GenderSelection);
}
