//! Registration dialogue: persisted stages, input validation and the
//! parameterized profile sub-flow shared by registration and profile editing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted length of a user's name, in characters
pub const MAX_NAME_CHARS: usize = 100;

lazy_static! {
    static ref PHONE_PATTERN: Regex =
        Regex::new(r"^(?:8\d{10}|7\d{10}|\+7\d{10})$").expect("phone pattern is a valid regex");
}

/// Persisted position of a user in the conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Start,
    GenderSelection,
    NameInput,
    PhoneInput,
    PhoneConfirmation,
    Registered,
    EditName,
    EditPhone,
    EditProfileGender,
    EditProfileName,
    EditProfilePhone,
    EditProfileConfirmation,
    Confirmation,
    EditNameSimple,
    EditProfileFixName,
    EditProfileFixPhone,
}

impl Stage {
    pub const ALL: [Stage; 16] = [
        Stage::Start,
        Stage::GenderSelection,
        Stage::NameInput,
        Stage::PhoneInput,
        Stage::PhoneConfirmation,
        Stage::Registered,
        Stage::EditName,
        Stage::EditPhone,
        Stage::EditProfileGender,
        Stage::EditProfileName,
        Stage::EditProfilePhone,
        Stage::EditProfileConfirmation,
        Stage::Confirmation,
        Stage::EditNameSimple,
        Stage::EditProfileFixName,
        Stage::EditProfileFixPhone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::GenderSelection => "gender_selection",
            Stage::NameInput => "name_input",
            Stage::PhoneInput => "phone_input",
            Stage::PhoneConfirmation => "phone_confirmation",
            Stage::Registered => "registered",
            Stage::EditName => "edit_name",
            Stage::EditPhone => "edit_phone",
            Stage::EditProfileGender => "edit_profile_gender",
            Stage::EditProfileName => "edit_profile_name",
            Stage::EditProfilePhone => "edit_profile_phone",
            Stage::EditProfileConfirmation => "edit_profile_confirmation",
            Stage::Confirmation => "confirmation",
            Stage::EditNameSimple => "edit_name_simple",
            Stage::EditProfileFixName => "edit_profile_fix_name",
            Stage::EditProfileFixPhone => "edit_profile_fix_phone",
        }
    }

    /// True once registration has been confirmed, including while a profile edit is in progress
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            Stage::Registered
                | Stage::EditProfileGender
                | Stage::EditProfileName
                | Stage::EditProfilePhone
                | Stage::EditProfileConfirmation
                | Stage::EditProfileFixName
                | Stage::EditProfileFixPhone
        )
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(
            self,
            Stage::PhoneConfirmation | Stage::Confirmation | Stage::EditProfileConfirmation
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unset,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unset => "unset",
        }
    }

    /// Localization key of the human-readable label
    pub fn label_key(&self) -> &'static str {
        match self {
            Gender::Male => "gender-male",
            Gender::Female => "gender-female",
            Gender::Unset => "gender-unset",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "unset" | "" => Ok(Gender::Unset),
            other => Err(format!("unknown gender '{other}'")),
        }
    }
}

/// Validates a user's name input
pub fn validate_name(name: &str) -> Result<String, &'static str> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}

/// Keeps the digits of `raw` and a leading `+`
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    normalized
}

/// A phone number that passed validation. The raw input is what gets stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneNumber {
    raw: String,
    normalized: String,
}

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        let normalized = normalize_phone(raw);
        if !PHONE_PATTERN.is_match(&normalized) {
            return Err("invalid_phone");
        }
        Ok(Self {
            raw: raw.trim().to_string(),
            normalized,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

/// Which registration flow is in use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowVariant {
    /// gender, name, phone, confirmation
    WithPhone,
    /// gender, name, confirmation
    NameOnly,
}

impl FromStr for FlowVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "with_phone" => Ok(FlowVariant::WithPhone),
            "simple" | "name_only" => Ok(FlowVariant::NameOnly),
            other => Err(format!("unknown registration flow '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowMode {
    Registration,
    ProfileEdit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStep {
    Gender,
    Name,
    Phone,
    Confirm,
    /// Correcting the name from the confirmation screen
    FixName,
    /// Correcting the phone from the confirmation screen
    FixPhone,
}

impl FlowStep {
    /// The step a stage belongs to, independent of flow variant
    pub fn of(stage: Stage) -> Option<FlowStep> {
        match stage {
            Stage::GenderSelection | Stage::EditProfileGender => Some(FlowStep::Gender),
            Stage::NameInput | Stage::EditProfileName => Some(FlowStep::Name),
            Stage::PhoneInput | Stage::EditProfilePhone => Some(FlowStep::Phone),
            Stage::PhoneConfirmation | Stage::Confirmation | Stage::EditProfileConfirmation => {
                Some(FlowStep::Confirm)
            }
            Stage::EditName | Stage::EditNameSimple | Stage::EditProfileFixName => {
                Some(FlowStep::FixName)
            }
            Stage::EditPhone | Stage::EditProfileFixPhone => Some(FlowStep::FixPhone),
            Stage::Start | Stage::Registered => None,
        }
    }

    pub fn accepts_text(&self) -> bool {
        matches!(
            self,
            FlowStep::Name | FlowStep::Phone | FlowStep::FixName | FlowStep::FixPhone
        )
    }
}

/// The gender, name, phone, confirm sub-flow.
///
/// Registration and profile editing run the same steps and differ only in
/// the stage names they persist; both rejoin [`ProfileFlow::return_stage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProfileFlow {
    pub mode: FlowMode,
    pub variant: FlowVariant,
}

impl ProfileFlow {
    pub fn registration(variant: FlowVariant) -> Self {
        Self {
            mode: FlowMode::Registration,
            variant,
        }
    }

    pub fn profile_edit(variant: FlowVariant) -> Self {
        Self {
            mode: FlowMode::ProfileEdit,
            variant,
        }
    }

    pub fn return_stage(&self) -> Stage {
        Stage::Registered
    }

    pub fn entry_stage(&self) -> Stage {
        match self.mode {
            FlowMode::Registration => Stage::GenderSelection,
            FlowMode::ProfileEdit => Stage::EditProfileGender,
        }
    }

    pub fn confirm_stage(&self) -> Stage {
        match (self.mode, self.variant) {
            (FlowMode::Registration, FlowVariant::WithPhone) => Stage::PhoneConfirmation,
            (FlowMode::Registration, FlowVariant::NameOnly) => Stage::Confirmation,
            (FlowMode::ProfileEdit, _) => Stage::EditProfileConfirmation,
        }
    }

    pub fn asks_phone(&self) -> bool {
        self.variant == FlowVariant::WithPhone
    }

    /// Persisted stage for a step, or `None` if this flow has no such step
    pub fn stage_for(&self, step: FlowStep) -> Option<Stage> {
        use FlowMode::*;
        use FlowVariant::*;

        match (self.mode, self.variant, step) {
            (_, _, FlowStep::Gender) => Some(self.entry_stage()),
            (_, _, FlowStep::Confirm) => Some(self.confirm_stage()),
            (Registration, _, FlowStep::Name) => Some(Stage::NameInput),
            (ProfileEdit, _, FlowStep::Name) => Some(Stage::EditProfileName),
            (ProfileEdit, _, FlowStep::FixName) => Some(Stage::EditProfileFixName),
            (Registration, WithPhone, FlowStep::Phone) => Some(Stage::PhoneInput),
            (Registration, WithPhone, FlowStep::FixName) => Some(Stage::EditName),
            (Registration, WithPhone, FlowStep::FixPhone) => Some(Stage::EditPhone),
            (Registration, NameOnly, FlowStep::FixName) => Some(Stage::EditNameSimple),
            (ProfileEdit, WithPhone, FlowStep::Phone) => Some(Stage::EditProfilePhone),
            (ProfileEdit, WithPhone, FlowStep::FixPhone) => Some(Stage::EditProfileFixPhone),
            (_, NameOnly, FlowStep::Phone | FlowStep::FixPhone) => None,
        }
    }

    /// Forward order of the steps
    pub fn next_step(&self, step: FlowStep) -> FlowStep {
        match step {
            FlowStep::Gender => FlowStep::Name,
            FlowStep::Name if self.asks_phone() => FlowStep::Phone,
            FlowStep::Name
            | FlowStep::Phone
            | FlowStep::Confirm
            | FlowStep::FixName
            | FlowStep::FixPhone => FlowStep::Confirm,
        }
    }

    /// Recovers the flow and step a persisted stage belongs to.
    ///
    /// Stages that only exist in one variant pin that variant; shared stages
    /// use the configured one.
    pub fn locate(stage: Stage, configured: FlowVariant) -> Option<(ProfileFlow, FlowStep)> {
        let step = FlowStep::of(stage)?;
        let flow = match stage {
            Stage::PhoneInput | Stage::PhoneConfirmation | Stage::EditName | Stage::EditPhone => {
                ProfileFlow::registration(FlowVariant::WithPhone)
            }
            Stage::Confirmation | Stage::EditNameSimple => {
                ProfileFlow::registration(FlowVariant::NameOnly)
            }
            Stage::EditProfilePhone | Stage::EditProfileFixPhone => {
                ProfileFlow::profile_edit(FlowVariant::WithPhone)
            }
            Stage::GenderSelection | Stage::NameInput => ProfileFlow::registration(configured),
            Stage::EditProfileGender
            | Stage::EditProfileName
            | Stage::EditProfileConfirmation
            | Stage::EditProfileFixName => ProfileFlow::profile_edit(configured),
            Stage::Start | Stage::Registered => return None,
        };
        Some((flow, step))
    }
}
