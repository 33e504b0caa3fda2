//! Transport-neutral outbound messages and the gateway the engine sends them through

use anyhow::Result;
use async_trait::async_trait;

use crate::payments::Invoice;

/// Inline button carrying a callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    pub fn button(self, button: Button) -> Self {
        self.row(vec![button])
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Text plus optional inline actions shown for a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Puts a notice above the prompt text
    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        if let Some(notice) = notice {
            self.text = format!("{notice}\n\n{}", self.text);
        }
        self
    }

    pub fn callback_data(&self) -> Vec<&str> {
        self.keyboard
            .iter()
            .flat_map(Keyboard::buttons)
            .map(|b| b.data.as_str())
            .collect()
    }
}

/// Anything the engine shows as the user's current screen
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Prompt(Prompt),
    Invoice(Invoice),
}

/// Sending side of the messenger
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Sends a message and returns its id
    async fn send_prompt(&self, chat_id: i64, prompt: &Prompt) -> Result<i32>;

    /// Deletes a message. Callers treat failures as non-fatal.
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;

    /// Sends a payment invoice and returns its message id
    async fn send_invoice(&self, chat_id: i64, invoice: &Invoice) -> Result<i32>;
}
