use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;
use unic_langid::LanguageIdentifier;

/// Languages shipped with the bot, with their embedded Fluent sources
const RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("ru", include_str!("../locales/ru/main.ftl")),
];

pub const FALLBACK_LANGUAGE: &str = "en";

type Bundle = FluentBundle<FluentResource>;

/// Localization manager for the storefront bot
pub struct LocalizationManager {
    bundles: HashMap<String, Bundle>,
    default_language: String,
}

impl LocalizationManager {
    /// Create a new localization manager with every embedded language loaded
    pub fn new(default_language: &str) -> Self {
        let mut bundles = HashMap::new();

        for (code, source) in RESOURCES {
            match Self::create_bundle(code, source) {
                Some(bundle) => {
                    bundles.insert(code.to_string(), bundle);
                }
                None => warn!(language = %code, "Skipping language with invalid identifier"),
            }
        }

        let default_language = if bundles.contains_key(default_language) {
            default_language.to_string()
        } else {
            warn!(language = %default_language, "Unsupported default language, falling back");
            FALLBACK_LANGUAGE.to_string()
        };

        Self {
            bundles,
            default_language,
        }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(code: &str, source: &str) -> Option<Bundle> {
        let locale: LanguageIdentifier = code.parse().ok()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language = %code, errors = ?errors, "Fluent resource parsed with errors");
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language = %code, errors = ?errors, "Fluent resource has duplicate messages");
        }

        Some(bundle)
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Picks the bundle for a language tag such as `ru` or `en-US`
    pub fn resolve_language(&self, language_code: Option<&str>) -> &str {
        language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(str::to_ascii_lowercase)
            .and_then(|primary| {
                self.bundles
                    .get_key_value(primary.as_str())
                    .map(|(key, _)| key.as_str())
            })
            .unwrap_or(self.default_language.as_str())
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language_code: &str,
        args: Option<&FluentArgs>,
    ) -> String {
        let language = self.resolve_language(Some(language_code));
        let Some(bundle) = self.bundles.get(language) else {
            return format!("Missing translation: {}", key);
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {}", key),
        };

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }
        value.into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(
        &self,
        key: &str,
        args: &[(&str, &str)],
        language_code: Option<&str>,
    ) -> String {
        let fluent_args = FluentArgs::from_iter(
            args.iter()
                .map(|(k, v)| (*k, FluentValue::from(*v))),
        );
        let language = self.resolve_language(language_code).to_string();
        self.get_message_in_language(key, &language, Some(&fluent_args))
    }
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager. Later calls keep the first manager.
pub fn init_localization(default_language: &str) {
    let _ = LOCALIZATION_MANAGER.set(LocalizationManager::new(default_language));
}

/// Get the global localization manager, initialising it with the fallback language if needed
pub fn get_localization_manager() -> &'static LocalizationManager {
    LOCALIZATION_MANAGER.get_or_init(|| LocalizationManager::new(FALLBACK_LANGUAGE))
}

/// Localized message in the user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    let manager = get_localization_manager();
    let language = manager.resolve_language(language_code);
    manager.get_message_in_language(key, language, None)
}

/// Localized message with arguments in the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    get_localization_manager().get_message_with_args(key, args, language_code)
}
