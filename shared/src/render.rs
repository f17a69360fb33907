//! Placeholder substitution for delivery command templates.
//!
//! Templates are admin-authored and passed to the remote console verbatim
//! after substitution; nothing is quoted or escaped here.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{(player|ign|username|quantity|amount|product|product_name)\}")
        .unwrap_or_else(|e| panic!("placeholder pattern is invalid: {e}"))
});

/// Values available to a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub recipient: String,
    pub quantity: u32,
    pub product_name: String,
}

/// The closed set of tokens a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Player,
    Quantity,
    Product,
}

impl Placeholder {
    /// Maps a token name (without braces) to its placeholder, ignoring case.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "player" | "ign" | "username" => Some(Self::Player),
            "quantity" | "amount" => Some(Self::Quantity),
            "product" | "product_name" => Some(Self::Product),
            _ => None,
        }
    }
}

impl RenderContext {
    pub fn new(recipient: impl Into<String>, quantity: u32, product_name: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            quantity,
            product_name: product_name.into(),
        }
    }

    fn value(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::Player => self.recipient.clone(),
            Placeholder::Quantity => self.quantity.to_string(),
            Placeholder::Product => self.product_name.clone(),
        }
    }
}

/// Substitutes every recognised placeholder in a single pass.
///
/// Substituted values are never re-scanned, so a player name that happens to
/// contain `{amount}` is emitted as-is. Unknown tokens are left untouched.
pub fn render_command(template: &str, ctx: &RenderContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match Placeholder::from_token(&caps[1]) {
                Some(placeholder) => ctx.value(placeholder),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
