//! Dialogue Manager module: registration and profile-edit transitions.
//!
//! Both flows run through [`ProfileFlow`]; handlers recover the flow and step
//! from the persisted stage and treat a button from another step as stale.

use tracing::{debug, info, warn};

use crate::dialogue::{validate_name, FlowMode, FlowStep, Gender, PhoneNumber, ProfileFlow, Stage};
use crate::errors::ConversationError;
use crate::localization::t_lang;
use crate::model::{ProfileUpdate, UserProfile};

use super::engine::{ConversationEngine, Turn};
use super::event::EditableField;
use super::ui_builder::{
    confirmation_prompt, edit_choice_prompt, flow_prompt, main_menu_prompt, materials_prompt,
    profile_updated_prompt,
};

impl ConversationEngine {
    fn locate(&self, turn: &Turn) -> Option<(ProfileFlow, FlowStep)> {
        ProfileFlow::locate(turn.stage(), self.settings.flow_variant)
    }

    async fn stale_button(&self, turn: &Turn) -> Result<(), ConversationError> {
        debug!(user_id = turn.user_id(), stage = %turn.stage(), "Stale button pressed");
        self.rerender_stage(turn, None).await
    }

    /// `/start`: begins registration, or returns a registered user to the main menu
    pub(super) async fn start(&self, turn: &Turn) -> Result<(), ConversationError> {
        if turn.stage().is_registered() {
            if turn.stage() != Stage::Registered {
                info!(user_id = turn.user_id(), stage = %turn.stage(), "Profile edit abandoned by /start");
            }
            self.set_stage(turn, Stage::Registered).await?;
            return self.show(turn, main_menu_prompt(turn.lang())).await;
        }

        let flow = ProfileFlow::registration(self.settings.flow_variant);
        self.set_stage(turn, flow.entry_stage()).await?;
        info!(user_id = turn.user_id(), "Registration started");
        self.show(turn, flow_prompt(flow, FlowStep::Gender, &turn.profile, turn.lang()))
            .await
    }

    /// Persists the stage of the step after `from` and shows its prompt
    async fn advance(
        &self,
        turn: &Turn,
        flow: ProfileFlow,
        from: FlowStep,
        profile: &UserProfile,
    ) -> Result<(), ConversationError> {
        let next = flow.next_step(from);
        let stage = flow.stage_for(next).unwrap_or_else(|| flow.confirm_stage());
        self.set_stage(turn, stage).await?;
        self.show(turn, flow_prompt(flow, next, profile, turn.lang())).await
    }

    async fn write_field(
        &self,
        turn: &Turn,
        update: ProfileUpdate,
    ) -> Result<UserProfile, ConversationError> {
        self.users.set_field(turn.user_id(), &update).await?;
        let mut profile = turn.profile.clone();
        profile.apply(&update);
        Ok(profile)
    }

    pub(super) async fn handle_gender(
        &self,
        turn: &Turn,
        gender: Gender,
    ) -> Result<(), ConversationError> {
        let Some((flow, FlowStep::Gender)) = self.locate(turn) else {
            return self.stale_button(turn).await;
        };
        let profile = self.write_field(turn, ProfileUpdate::Gender(gender)).await?;
        debug!(user_id = turn.user_id(), gender = %gender, "Gender stored");
        self.advance(turn, flow, FlowStep::Gender, &profile).await
    }

    /// Free text on a name or phone step
    pub(super) async fn handle_flow_input(
        &self,
        turn: &Turn,
        step: FlowStep,
        text: &str,
    ) -> Result<(), ConversationError> {
        let Some((flow, located)) = self.locate(turn) else {
            return self.rerender_stage(turn, None).await;
        };
        if located != step {
            return self.rerender_stage(turn, None).await;
        }

        let update = match step {
            FlowStep::Name | FlowStep::FixName => validate_name(text)
                .map(ProfileUpdate::Name)
                .map_err(|reason| match reason {
                    "too_long" => "name-too-long",
                    _ => "name-invalid",
                }),
            FlowStep::Phone | FlowStep::FixPhone => PhoneNumber::parse(text)
                .map(ProfileUpdate::Phone)
                .map_err(|_| "phone-invalid"),
            FlowStep::Gender | FlowStep::Confirm => {
                return self.rerender_stage(turn, None).await;
            }
        };

        match update {
            Ok(update) => {
                let profile = self.write_field(turn, update).await?;
                self.advance(turn, flow, step, &profile).await
            }
            Err(key) => {
                warn!(user_id = turn.user_id(), stage = %turn.stage(), reason = key, "Rejected profile input");
                let prompt = flow_prompt(flow, step, &turn.profile, turn.lang())
                    .with_notice(Some(t_lang(key, turn.lang())));
                self.show(turn, prompt).await
            }
        }
    }

    /// Skips a profile-edit step without changing the field
    pub(super) async fn handle_keep_current(&self, turn: &Turn) -> Result<(), ConversationError> {
        match self.locate(turn) {
            Some((flow, step))
                if flow.mode == FlowMode::ProfileEdit && step != FlowStep::Confirm =>
            {
                self.advance(turn, flow, step, &turn.profile).await
            }
            _ => self.stale_button(turn).await,
        }
    }

    pub(super) async fn handle_confirm(&self, turn: &Turn) -> Result<(), ConversationError> {
        let Some((flow, FlowStep::Confirm)) = self.locate(turn) else {
            return self.stale_button(turn).await;
        };
        self.set_stage(turn, flow.return_stage()).await?;

        match flow.mode {
            FlowMode::Registration => {
                info!(user_id = turn.user_id(), "Registration completed");
                let prompt = materials_prompt(
                    &turn.profile,
                    &self.settings.materials,
                    self.settings.question_link.as_deref(),
                    turn.lang(),
                );
                self.show(turn, prompt).await
            }
            FlowMode::ProfileEdit => {
                info!(user_id = turn.user_id(), "Profile edit confirmed");
                self.show(turn, profile_updated_prompt(turn.lang())).await
            }
        }
    }

    /// Opens the field choice from the confirmation screen; the stage does not change
    pub(super) async fn handle_edit_registration(&self, turn: &Turn) -> Result<(), ConversationError> {
        let Some((flow, FlowStep::Confirm)) = self.locate(turn) else {
            return self.stale_button(turn).await;
        };
        self.show(turn, edit_choice_prompt(flow, turn.lang())).await
    }

    pub(super) async fn handle_edit_field(
        &self,
        turn: &Turn,
        field: EditableField,
    ) -> Result<(), ConversationError> {
        let Some((flow, FlowStep::Confirm)) = self.locate(turn) else {
            return self.stale_button(turn).await;
        };
        let step = match field {
            EditableField::Name => FlowStep::FixName,
            EditableField::Phone => FlowStep::FixPhone,
        };
        let Some(stage) = flow.stage_for(step) else {
            return self.stale_button(turn).await;
        };
        self.set_stage(turn, stage).await?;
        self.show(turn, flow_prompt(flow, step, &turn.profile, turn.lang()))
            .await
    }

    pub(super) async fn handle_back_to_confirmation(
        &self,
        turn: &Turn,
    ) -> Result<(), ConversationError> {
        match self.locate(turn) {
            Some((flow, FlowStep::Confirm | FlowStep::FixName | FlowStep::FixPhone)) => {
                self.set_stage(turn, flow.confirm_stage()).await?;
                self.show(turn, confirmation_prompt(flow, &turn.profile, turn.lang()))
                    .await
            }
            _ => self.stale_button(turn).await,
        }
    }

    pub(super) async fn handle_cancel_edit(&self, turn: &Turn) -> Result<(), ConversationError> {
        match self.locate(turn) {
            Some((flow, _)) if flow.mode == FlowMode::ProfileEdit => {
                self.set_stage(turn, flow.return_stage()).await?;
                info!(user_id = turn.user_id(), "Profile edit cancelled");
                self.show(turn, main_menu_prompt(turn.lang())).await
            }
            _ => self.stale_button(turn).await,
        }
    }

    /// Restarts the profile sub-flow in edit mode
    pub(super) async fn handle_edit_profile(&self, turn: &Turn) -> Result<(), ConversationError> {
        let flow = ProfileFlow::profile_edit(self.settings.flow_variant);
        self.set_stage(turn, flow.entry_stage()).await?;
        info!(user_id = turn.user_id(), "Profile edit started");
        self.show(turn, flow_prompt(flow, FlowStep::Gender, &turn.profile, turn.lang()))
            .await
    }
}
