//! # Localization Tests
//!
//! Message lookup, argument formatting and language fallback for the
//! bundled English and Russian resources.

use std::collections::BTreeSet;

use fluent_bundle::{FluentArgs, FluentValue};
use storefront_bot::localization::{t_args_lang, t_lang, LocalizationManager};

const EN_SOURCE: &str = include_str!("../locales/en/main.ftl");
const RU_SOURCE: &str = include_str!("../locales/ru/main.ftl");

/// Message identifiers defined at the start of a line
fn message_keys(source: &str) -> BTreeSet<&str> {
    source
        .lines()
        .filter(|line| line.starts_with(|c: char| c.is_ascii_lowercase()))
        .filter_map(|line| line.split_once(" ="))
        .map(|(key, _)| key.trim())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new("en")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("main-menu-title", "en", None);
        assert!(message.contains("Main menu"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert!(message.starts_with("Missing translation:"));
    }

    #[test]
    fn test_unsupported_language_falls_back_to_default() {
        let manager = setup_localization();

        let fallback = manager.get_message_in_language("cart-empty", "de", None);
        let english = manager.get_message_in_language("cart-empty", "en", None);
        assert_eq!(fallback, english);
    }

    #[test]
    fn test_russian_differs_from_english() {
        let manager = setup_localization();

        let russian = manager.get_message_in_language("phone-prompt", "ru", None);
        let english = manager.get_message_in_language("phone-prompt", "en", None);
        assert!(!russian.is_empty());
        assert_ne!(russian, english);
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = FluentArgs::new();
        args.set("order_id", FluentValue::from("17"));
        args.set("total", FluentValue::from("250"));
        args.set("currency", FluentValue::from("RUB"));

        let message = manager.get_message_in_language("order-created", "en", Some(&args));
        assert!(message.contains("#17"));
        assert!(message.contains("250 RUB"));
    }

    #[test]
    fn test_missing_args_still_render() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("order-created", "en", None);
        assert!(!message.is_empty());
        assert!(!message.starts_with("Missing"));
    }

    #[test]
    fn test_language_resolution() {
        let manager = setup_localization();

        assert_eq!(manager.resolve_language(Some("en")), "en");
        assert_eq!(manager.resolve_language(Some("ru-RU")), "ru");
        assert_eq!(manager.resolve_language(Some("RU")), "ru");
        assert_eq!(manager.resolve_language(Some("pt_BR")), "en");
        assert_eq!(manager.resolve_language(None), "en");
    }

    #[test]
    fn test_unknown_default_language_falls_back() {
        let manager = LocalizationManager::new("xx");
        assert_eq!(manager.default_language(), "en");

        let manager = LocalizationManager::new("ru");
        assert_eq!(manager.resolve_language(None), "ru");
    }

    #[test]
    fn test_both_languages_define_the_same_keys() {
        let english = message_keys(EN_SOURCE);
        let russian = message_keys(RU_SOURCE);

        assert!(english.contains("welcome"));
        assert_eq!(
            english.symmetric_difference(&russian).collect::<Vec<_>>(),
            Vec::<&&str>::new()
        );
    }

    #[test]
    fn test_every_key_has_a_value() {
        let manager = setup_localization();

        for language in ["en", "ru"] {
            for key in message_keys(EN_SOURCE) {
                let message = manager.get_message_in_language(key, language, None);
                assert!(!message.starts_with("Missing"), "{language}: {key}");
            }
        }
    }

    #[test]
    fn test_convenience_functions() {
        let message = t_lang("help-text", Some("en"));
        assert!(message.contains("/start"));

        let message = t_args_lang("added-to-cart", &[("name", "Green tea")], Some("en"));
        assert!(message.contains("Green tea"));
    }
}
