//! UI Builder module for creating keyboards and formatting messages

use crate::config::Material;
use crate::dialogue::{FlowMode, FlowStep, Gender, ProfileFlow};
use crate::localization::{t_args_lang, t_lang};
use crate::model::{Cart, MeetingInvite, Order, Product, SpecialOffer, UserProfile};

use super::event::{CallbackAction, EditableField};
use super::gateway::{Button, Keyboard, Prompt};

/// Telegram rejects button labels much longer than this
const MAX_BUTTON_LABEL_CHARS: usize = 40;

/// Users shown by the admin users list before it is cut short
const ADMIN_USERS_SHOWN: usize = 20;

fn button(label: impl Into<String>, action: CallbackAction) -> Button {
    Button::new(label, action.data())
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() > MAX_BUTTON_LABEL_CHARS {
        let cut: String = label.chars().take(MAX_BUTTON_LABEL_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        label.to_string()
    }
}

fn gender_label(gender: Gender, language_code: Option<&str>) -> String {
    t_lang(gender.label_key(), language_code)
}

fn main_menu_button(language_code: Option<&str>) -> Button {
    button(t_lang("main-menu-button", language_code), CallbackAction::MainMenu)
}

/// Keep-current and cancel buttons offered on every profile-edit step
fn edit_controls(flow: ProfileFlow, language_code: Option<&str>) -> Vec<Button> {
    match flow.mode {
        FlowMode::Registration => vec![],
        FlowMode::ProfileEdit => vec![
            button(t_lang("keep-current-button", language_code), CallbackAction::KeepCurrent),
            button(t_lang("cancel-edit-button", language_code), CallbackAction::CancelEdit),
        ],
    }
}

pub fn gender_keyboard(language_code: Option<&str>) -> Keyboard {
    Keyboard::new().row(vec![
        button(
            t_lang("gender-male-button", language_code),
            CallbackAction::Gender(Gender::Male),
        ),
        button(
            t_lang("gender-female-button", language_code),
            CallbackAction::Gender(Gender::Female),
        ),
    ])
}

pub fn main_menu_keyboard(language_code: Option<&str>) -> Keyboard {
    Keyboard::new()
        .row(vec![
            button(t_lang("menu-catalog-button", language_code), CallbackAction::Catalog),
            button(t_lang("menu-cart-button", language_code), CallbackAction::Cart),
        ])
        .row(vec![
            button(t_lang("menu-orders-button", language_code), CallbackAction::Orders),
            button(t_lang("menu-profile-button", language_code), CallbackAction::Profile),
        ])
}

pub fn main_menu_prompt(language_code: Option<&str>) -> Prompt {
    Prompt::new(t_lang("main-menu-title", language_code))
        .with_keyboard(main_menu_keyboard(language_code))
}

pub fn help_prompt(language_code: Option<&str>) -> Prompt {
    Prompt::new(t_lang("help-text", language_code))
}

/// The prompt shown while a user is on `step` of `flow`
pub fn flow_prompt(
    flow: ProfileFlow,
    step: FlowStep,
    profile: &UserProfile,
    language_code: Option<&str>,
) -> Prompt {
    let controls = edit_controls(flow, language_code);
    let back = button(
        t_lang("back-button", language_code),
        CallbackAction::BackToConfirmation,
    );

    match (flow.mode, step) {
        (_, FlowStep::Confirm) => confirmation_prompt(flow, profile, language_code),
        (FlowMode::Registration, FlowStep::Gender) => {
            let first_name = profile.first_name.clone().unwrap_or_default();
            Prompt::new(t_args_lang(
                "welcome",
                &[("first_name", &first_name)],
                language_code,
            ))
            .with_keyboard(gender_keyboard(language_code))
        }
        (FlowMode::ProfileEdit, FlowStep::Gender) => {
            let current = gender_label(profile.gender, language_code);
            let mut keyboard = gender_keyboard(language_code);
            keyboard = keyboard.row(controls);
            Prompt::new(t_args_lang(
                "edit-profile-gender",
                &[("gender", &current)],
                language_code,
            ))
            .with_keyboard(keyboard)
        }
        (FlowMode::Registration, FlowStep::Name) => Prompt::new(t_lang("name-prompt", language_code)),
        (FlowMode::Registration, FlowStep::FixName) => {
            Prompt::new(t_lang("name-prompt", language_code))
                .with_keyboard(Keyboard::new().button(back))
        }
        (FlowMode::ProfileEdit, FlowStep::Name | FlowStep::FixName) => {
            let current = profile.name.clone().unwrap_or_default();
            let keyboard = if step == FlowStep::FixName {
                Keyboard::new().button(back)
            } else {
                Keyboard::new().row(controls)
            };
            Prompt::new(t_args_lang(
                "edit-profile-name",
                &[("name", &current)],
                language_code,
            ))
            .with_keyboard(keyboard)
        }
        (FlowMode::Registration, FlowStep::Phone) => {
            Prompt::new(t_lang("phone-prompt", language_code))
        }
        (FlowMode::Registration, FlowStep::FixPhone) => {
            Prompt::new(t_lang("phone-prompt", language_code))
                .with_keyboard(Keyboard::new().button(back))
        }
        (FlowMode::ProfileEdit, FlowStep::Phone | FlowStep::FixPhone) => {
            let current = profile.phone.clone().unwrap_or_default();
            let keyboard = if step == FlowStep::FixPhone {
                Keyboard::new().button(back)
            } else {
                Keyboard::new().row(controls)
            };
            Prompt::new(t_args_lang(
                "edit-profile-phone",
                &[("phone", &current)],
                language_code,
            ))
            .with_keyboard(keyboard)
        }
    }
}

/// Summary of the collected profile with confirm and edit buttons
pub fn confirmation_prompt(
    flow: ProfileFlow,
    profile: &UserProfile,
    language_code: Option<&str>,
) -> Prompt {
    let gender = gender_label(profile.gender, language_code);
    let name = profile.name.clone().unwrap_or_default();
    let summary = if flow.asks_phone() {
        let phone = profile.phone.clone().unwrap_or_default();
        t_args_lang(
            "confirm-summary",
            &[("gender", &gender), ("name", &name), ("phone", &phone)],
            language_code,
        )
    } else {
        t_args_lang(
            "confirm-summary-simple",
            &[("gender", &gender), ("name", &name)],
            language_code,
        )
    };

    let mut keyboard = Keyboard::new().row(vec![
        button(t_lang("confirm-button", language_code), CallbackAction::ConfirmRegistration),
        button(t_lang("edit-button", language_code), CallbackAction::EditRegistration),
    ]);
    if flow.mode == FlowMode::ProfileEdit {
        keyboard = keyboard.button(button(
            t_lang("cancel-edit-button", language_code),
            CallbackAction::CancelEdit,
        ));
    }

    Prompt::new(format!("{}\n\n{}", t_lang("confirm-title", language_code), summary))
        .with_keyboard(keyboard)
}

/// Which field to correct from the confirmation screen
pub fn edit_choice_prompt(flow: ProfileFlow, language_code: Option<&str>) -> Prompt {
    let mut fields = vec![button(
        t_lang("edit-name-button", language_code),
        CallbackAction::EditField(EditableField::Name),
    )];
    if flow.asks_phone() {
        fields.push(button(
            t_lang("edit-phone-button", language_code),
            CallbackAction::EditField(EditableField::Phone),
        ));
    }
    Prompt::new(t_lang("edit-choice-title", language_code)).with_keyboard(
        Keyboard::new().row(fields).button(button(
            t_lang("back-button", language_code),
            CallbackAction::BackToConfirmation,
        )),
    )
}

/// Thank-you screen with the free materials, shown once registration is confirmed
pub fn materials_prompt(
    profile: &UserProfile,
    materials: &[Material],
    question_link: Option<&str>,
    language_code: Option<&str>,
) -> Prompt {
    let name = profile.display_name();
    let mut text = t_args_lang("materials-title", &[("name", &name)], language_code);
    for (i, material) in materials.iter().enumerate() {
        text.push_str(&format!("\n\n{}. {}\n{}", i + 1, material.title, material.url));
    }
    if let Some(link) = question_link {
        text.push_str("\n\n");
        text.push_str(&t_args_lang("question-link", &[("link", link)], language_code));
    }
    Prompt::new(text).with_keyboard(main_menu_keyboard(language_code))
}

pub fn profile_updated_prompt(language_code: Option<&str>) -> Prompt {
    main_menu_prompt(language_code).with_notice(Some(t_lang("profile-updated", language_code)))
}

pub fn profile_prompt(profile: &UserProfile, language_code: Option<&str>) -> Prompt {
    let gender = gender_label(profile.gender, language_code);
    let name = profile.name.clone().unwrap_or_default();
    let phone = profile
        .phone
        .clone()
        .unwrap_or_else(|| t_lang("not-provided", language_code));
    let registered = profile.registration_date.format("%d.%m.%Y").to_string();
    let text = t_args_lang(
        "profile-card",
        &[
            ("gender", &gender),
            ("name", &name),
            ("phone", &phone),
            ("registered", &registered),
        ],
        language_code,
    );
    Prompt::new(text).with_keyboard(
        Keyboard::new()
            .button(button(
                t_lang("edit-profile-button", language_code),
                CallbackAction::EditProfile,
            ))
            .button(main_menu_button(language_code)),
    )
}

pub fn catalog_prompt(products: &[Product], currency: &str, language_code: Option<&str>) -> Prompt {
    let mut keyboard = Keyboard::new();
    for product in products {
        let price = product.price.to_string();
        let label = t_args_lang(
            "catalog-item",
            &[("name", &product.name), ("price", &price), ("currency", currency)],
            language_code,
        );
        keyboard = keyboard.button(button(truncate_label(&label), CallbackAction::Product(product.id)));
    }
    keyboard = keyboard.row(vec![
        button(t_lang("menu-cart-button", language_code), CallbackAction::Cart),
        main_menu_button(language_code),
    ]);

    let title = if products.is_empty() {
        t_lang("catalog-empty", language_code)
    } else {
        t_lang("catalog-title", language_code)
    };
    Prompt::new(title).with_keyboard(keyboard)
}

pub fn product_prompt(
    product: &Product,
    currency: &str,
    payments_enabled: bool,
    language_code: Option<&str>,
) -> Prompt {
    let price = product.price.to_string();
    let text = t_args_lang(
        "product-card",
        &[
            ("name", &product.name),
            ("price", &price),
            ("currency", currency),
            ("description", &product.description),
        ],
        language_code,
    );

    let mut actions = vec![button(
        t_lang("add-to-cart-button", language_code),
        CallbackAction::AddToCart(product.id),
    )];
    if payments_enabled {
        actions.push(button(
            t_lang("buy-now-button", language_code),
            CallbackAction::BuyProduct(product.id),
        ));
    }

    Prompt::new(text).with_keyboard(
        Keyboard::new()
            .row(actions)
            .button(button(t_lang("back-to-catalog-button", language_code), CallbackAction::Catalog)),
    )
}

pub fn cart_prompt(cart: &Cart, currency: &str, language_code: Option<&str>) -> Prompt {
    if cart.is_empty() {
        return Prompt::new(t_lang("cart-empty", language_code)).with_keyboard(
            Keyboard::new().row(vec![
                button(t_lang("menu-catalog-button", language_code), CallbackAction::Catalog),
                main_menu_button(language_code),
            ]),
        );
    }

    let mut text = t_lang("cart-title", language_code);
    let mut keyboard = Keyboard::new();
    for item in &cart.items {
        let quantity = item.quantity.to_string();
        let total = item.line_total().to_string();
        text.push('\n');
        text.push_str(&t_args_lang(
            "cart-line",
            &[
                ("name", &item.name),
                ("quantity", &quantity),
                ("total", &total),
                ("currency", currency),
            ],
            language_code,
        ));
        let label = t_args_lang("remove-item-button", &[("name", &item.name)], language_code);
        keyboard = keyboard.button(button(
            truncate_label(&label),
            CallbackAction::RemoveFromCart(item.product_id),
        ));
    }
    let total = cart.total().to_string();
    text.push_str("\n\n");
    text.push_str(&t_args_lang(
        "cart-total",
        &[("total", &total), ("currency", currency)],
        language_code,
    ));

    keyboard = keyboard
        .row(vec![
            button(t_lang("checkout-button", language_code), CallbackAction::Checkout),
            button(t_lang("clear-cart-button", language_code), CallbackAction::ClearCart),
        ])
        .row(vec![
            button(t_lang("menu-catalog-button", language_code), CallbackAction::Catalog),
            main_menu_button(language_code),
        ]);

    Prompt::new(text).with_keyboard(keyboard)
}

fn order_lines(order: &Order, currency: &str, language_code: Option<&str>) -> String {
    order
        .items
        .iter()
        .map(|item| {
            let quantity = item.quantity.to_string();
            let total = item.line_total().to_string();
            t_args_lang(
                "cart-line",
                &[
                    ("name", &item.name),
                    ("quantity", &quantity),
                    ("total", &total),
                    ("currency", currency),
                ],
                language_code,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn order_created_prompt(
    order: &Order,
    currency: &str,
    payments_enabled: bool,
    language_code: Option<&str>,
) -> Prompt {
    let order_id = order.id.to_string();
    let total = order.total_amount.to_string();
    let mut text = t_args_lang(
        "order-created",
        &[("order_id", &order_id), ("total", &total), ("currency", currency)],
        language_code,
    );
    text.push_str("\n\n");
    text.push_str(&order_lines(order, currency, language_code));

    let mut keyboard = Keyboard::new();
    if payments_enabled {
        keyboard = keyboard.button(button(
            t_lang("pay-button", language_code),
            CallbackAction::PayOrder(order.id),
        ));
    } else {
        text.push_str("\n\n");
        text.push_str(&t_lang("payments-unavailable", language_code));
    }
    keyboard = keyboard.button(main_menu_button(language_code));

    Prompt::new(text).with_keyboard(keyboard)
}

pub fn orders_prompt(orders: &[Order], currency: &str, language_code: Option<&str>) -> Prompt {
    let text = if orders.is_empty() {
        t_lang("orders-empty", language_code)
    } else {
        let mut text = t_lang("orders-title", language_code);
        for order in orders {
            let order_id = order.id.to_string();
            let total = order.total_amount.to_string();
            let status = t_lang(order.status.label_key(), language_code);
            let date = order.created_at.format("%d.%m.%Y").to_string();
            text.push('\n');
            text.push_str(&t_args_lang(
                "order-line",
                &[
                    ("order_id", &order_id),
                    ("total", &total),
                    ("currency", currency),
                    ("status", &status),
                    ("date", &date),
                ],
                language_code,
            ));
        }
        text
    };
    Prompt::new(text).with_keyboard(Keyboard::new().button(main_menu_button(language_code)))
}

pub fn payment_success_prompt(
    order: &Order,
    currency: &str,
    contact: Option<&str>,
    language_code: Option<&str>,
) -> Prompt {
    let order_id = order.id.to_string();
    let total = order.total_amount.to_string();
    let mut text = t_args_lang(
        "payment-success",
        &[("order_id", &order_id), ("total", &total), ("currency", currency)],
        language_code,
    );
    if let Some(contact) = contact {
        text.push_str("\n\n");
        text.push_str(&t_args_lang("payment-contact", &[("contact", contact)], language_code));
    }
    Prompt::new(text).with_keyboard(Keyboard::new().button(main_menu_button(language_code)))
}

pub fn payment_failed_prompt(reason_key: &str, language_code: Option<&str>) -> Prompt {
    Prompt::new(format!(
        "{}\n\n{}",
        t_lang(reason_key, language_code),
        t_lang("payment-failed", language_code)
    ))
    .with_keyboard(Keyboard::new().button(main_menu_button(language_code)))
}

/// Figures shown to the chat admin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSummary {
    pub users: usize,
    pub registered: usize,
    pub orders: usize,
    pub paid_orders: usize,
    pub revenue: i64,
}

pub fn admin_prompt(summary: &AdminSummary, currency: &str, language_code: Option<&str>) -> Prompt {
    let users = summary.users.to_string();
    let registered = summary.registered.to_string();
    let orders = summary.orders.to_string();
    let paid = summary.paid_orders.to_string();
    let revenue = summary.revenue.to_string();
    Prompt::new(t_args_lang(
        "admin-stats",
        &[
            ("users", &users),
            ("registered", &registered),
            ("orders", &orders),
            ("paid", &paid),
            ("revenue", &revenue),
            ("currency", currency),
        ],
        language_code,
    ))
    .with_keyboard(
        Keyboard::new()
            .button(button(
                t_lang("admin-users-button", language_code),
                CallbackAction::AdminUsers,
            ))
            .button(main_menu_button(language_code)),
    )
}

/// The most recent users, one line each
pub fn admin_users_prompt(users: &[UserProfile], language_code: Option<&str>) -> Prompt {
    let mut text = t_args_lang(
        "admin-users-title",
        &[("count", &users.len().to_string())],
        language_code,
    );
    text.push_str("\n\n");

    if users.is_empty() {
        text.push_str(&t_lang("admin-users-empty", language_code));
    } else {
        let mut recent: Vec<&UserProfile> = users.iter().collect();
        recent.sort_by(|a, b| b.registration_date.cmp(&a.registration_date));
        let lines: Vec<String> = recent
            .iter()
            .take(ADMIN_USERS_SHOWN)
            .map(|user| {
                t_args_lang(
                    "admin-user-line",
                    &[
                        ("user_id", &user.user_id.to_string()),
                        ("name", user.name.as_deref().or(user.first_name.as_deref()).unwrap_or("-")),
                        ("phone", user.phone.as_deref().unwrap_or("-")),
                        ("stage", user.stage.as_str()),
                    ],
                    language_code,
                )
            })
            .collect();
        text.push_str(&lines.join("\n"));
        if users.len() > ADMIN_USERS_SHOWN {
            text.push('\n');
            text.push_str(&t_args_lang(
                "admin-users-more",
                &[("count", &(users.len() - ADMIN_USERS_SHOWN).to_string())],
                language_code,
            ));
        }
    }

    Prompt::new(text).with_keyboard(Keyboard::new().button(main_menu_button(language_code)))
}

/// Title and body of a `/meeting` announcement
pub fn meeting_announcement(invite: &MeetingInvite, language_code: Option<&str>) -> (String, String) {
    let title = t_args_lang("meeting-title", &[("title", &invite.title)], language_code);
    let mut lines = vec![t_args_lang(
        "meeting-body",
        &[("description", &invite.description), ("date", &invite.date)],
        language_code,
    )];
    if let Some(link) = &invite.link {
        lines.push(t_args_lang("meeting-link", &[("link", link)], language_code));
    }
    lines.push(String::new());
    lines.push(t_lang("meeting-footer", language_code));
    (title, lines.join("\n"))
}

/// Title and body of an `/offer` announcement
pub fn offer_announcement(offer: &SpecialOffer, language_code: Option<&str>) -> (String, String) {
    let title = t_args_lang("offer-title", &[("title", &offer.title)], language_code);
    let mut lines = vec![t_args_lang(
        "offer-body",
        &[("description", &offer.description)],
        language_code,
    )];
    if let Some(discount) = &offer.discount {
        lines.push(t_args_lang("offer-discount", &[("discount", discount)], language_code));
    }
    if let Some(valid_until) = &offer.valid_until {
        lines.push(t_args_lang(
            "offer-valid-until",
            &[("valid_until", valid_until)],
            language_code,
        ));
    }
    lines.push(String::new());
    lines.push(t_lang("offer-footer", language_code));
    (title, lines.join("\n"))
}

/// Broadcast text as users receive it
pub fn broadcast_prompt(title: &str, message: &str, language_code: Option<&str>) -> Prompt {
    Prompt::new(t_args_lang(
        "broadcast-message",
        &[("title", title), ("message", message)],
        language_code,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::FlowVariant;
    use crate::model::{CartItem, UserIdentity};
    use chrono::Utc;

    fn profile() -> UserProfile {
        let mut identity = UserIdentity::new(1);
        identity.first_name = Some("Alex".into());
        let mut profile = UserProfile::new(&identity, Utc::now());
        profile.gender = Gender::Male;
        profile.name = Some("Alex".into());
        profile.phone = Some("+79117929394".into());
        profile
    }

    #[test]
    fn test_gender_prompt_offers_both_genders() {
        let flow = ProfileFlow::registration(FlowVariant::WithPhone);
        let prompt = flow_prompt(flow, FlowStep::Gender, &profile(), Some("en"));
        assert_eq!(prompt.callback_data(), vec!["gender_male", "gender_female"]);
        assert!(prompt.text.contains("Alex"));
    }

    #[test]
    fn test_edit_steps_offer_keep_current() {
        let flow = ProfileFlow::profile_edit(FlowVariant::WithPhone);
        for step in [FlowStep::Gender, FlowStep::Name, FlowStep::Phone] {
            let prompt = flow_prompt(flow, step, &profile(), Some("en"));
            assert!(prompt.callback_data().contains(&"keep_current"), "{step:?}");
            assert!(prompt.callback_data().contains(&"cancel_edit"), "{step:?}");
        }
    }

    #[test]
    fn test_edit_fix_steps_go_back_to_confirmation() {
        let flow = ProfileFlow::profile_edit(FlowVariant::WithPhone);
        for step in [FlowStep::FixName, FlowStep::FixPhone] {
            let prompt = flow_prompt(flow, step, &profile(), Some("en"));
            assert_eq!(prompt.callback_data(), vec!["back_to_confirmation"], "{step:?}");
        }
    }

    #[test]
    fn test_confirmation_shows_collected_fields() {
        let flow = ProfileFlow::registration(FlowVariant::WithPhone);
        let prompt = confirmation_prompt(flow, &profile(), Some("en"));
        assert!(prompt.text.contains("Male"));
        assert!(prompt.text.contains("Alex"));
        assert!(prompt.text.contains("+79117929394"));
        assert_eq!(prompt.callback_data(), vec!["confirm_registration", "edit_registration"]);
    }

    #[test]
    fn test_simple_flow_confirmation_hides_phone() {
        let flow = ProfileFlow::registration(FlowVariant::NameOnly);
        let prompt = confirmation_prompt(flow, &profile(), Some("en"));
        assert!(!prompt.text.contains("+79117929394"));
        let choice = edit_choice_prompt(flow, Some("en"));
        assert!(!choice.callback_data().contains(&"edit_field_phone"));
    }

    #[test]
    fn test_cart_prompt_lists_lines_and_total() {
        let cart = Cart {
            items: vec![
                CartItem { product_id: 1, name: "A".into(), unit_price: 100, quantity: 2 },
                CartItem { product_id: 2, name: "B".into(), unit_price: 50, quantity: 1 },
            ],
        };
        let prompt = cart_prompt(&cart, "RUB", Some("en"));
        assert!(prompt.text.contains("250"));
        assert!(prompt.callback_data().contains(&"remove_1"));
        assert!(prompt.callback_data().contains(&"checkout"));
    }

    #[test]
    fn test_meeting_announcement_skips_missing_link() {
        let mut invite = MeetingInvite {
            title: "Q&A".into(),
            description: "Live session".into(),
            date: "Friday 19:00".into(),
            link: None,
        };
        let (title, body) = meeting_announcement(&invite, Some("en"));
        assert!(title.contains("Q&A"));
        assert!(body.contains("Live session"));
        assert!(body.contains("Friday 19:00"));
        assert!(!body.contains("https://"));

        invite.link = Some("https://meet.example".into());
        let (_, body) = meeting_announcement(&invite, Some("en"));
        assert!(body.contains("https://meet.example"));
    }

    #[test]
    fn test_offer_announcement_lists_optional_parts() {
        let offer = SpecialOffer {
            title: "Spring sale".into(),
            description: "All courses".into(),
            discount: Some("20%".into()),
            valid_until: None,
        };
        let (title, body) = offer_announcement(&offer, Some("en"));
        assert!(title.contains("Spring sale"));
        assert!(body.contains("20%"));
        assert!(!body.contains("Valid until"));
    }

    #[test]
    fn test_admin_users_list_is_capped() {
        let users: Vec<UserProfile> = (0..ADMIN_USERS_SHOWN + 5).map(|_| profile()).collect();
        let prompt = admin_users_prompt(&users, Some("en"));
        assert_eq!(prompt.text.matches("+79117929394").count(), ADMIN_USERS_SHOWN);
        assert!(prompt.text.contains("and 5 more"));

        let prompt = admin_users_prompt(&[], Some("en"));
        assert!(prompt.text.contains("No users yet."));
        assert_eq!(prompt.callback_data(), vec!["main_menu"]);
    }

    #[test]
    fn test_long_labels_are_truncated() {
        let label = truncate_label(&"x".repeat(100));
        assert_eq!(label.chars().count(), MAX_BUTTON_LABEL_CHARS);
        assert!(label.ends_with("..."));
    }
}
