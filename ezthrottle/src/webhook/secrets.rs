//! Webhook secret material.

use crate::errors::EzThrottleError;
use serde::{Deserialize, Serialize};

/// Minimum length of a webhook secret.
pub const MIN_SECRET_LEN: usize = 16;

/// The primary and optional secondary secret of one account.
///
/// The secondary secret stays valid during rotation until every sender has
/// switched to the new primary.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSecretSet")]
pub struct WebhookSecretSet {
    primary_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary_secret: Option<String>,
}

impl WebhookSecretSet {
    /// Creates a set with only a primary secret.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::InvalidSecret`] if the secret is shorter
    /// than [`MIN_SECRET_LEN`].
    pub fn new(primary: impl Into<String>) -> Result<Self, EzThrottleError> {
        let primary = primary.into();
        check_len("primary", &primary)?;
        Ok(Self {
            primary_secret: primary,
            secondary_secret: None,
        })
    }

    /// Adds a secondary secret.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::InvalidSecret`] if the secret is shorter
    /// than [`MIN_SECRET_LEN`].
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Result<Self, EzThrottleError> {
        let secondary = secondary.into();
        check_len("secondary", &secondary)?;
        self.secondary_secret = Some(secondary);
        Ok(self)
    }

    /// Returns the primary secret.
    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary_secret
    }

    /// Returns the secondary secret, if any.
    #[must_use]
    pub fn secondary(&self) -> Option<&str> {
        self.secondary_secret.as_deref()
    }

    /// Returns a view safe to log or display.
    #[must_use]
    pub fn masked(&self) -> MaskedSecretSet {
        MaskedSecretSet {
            primary_secret: mask_secret(&self.primary_secret),
            secondary_secret: self.secondary_secret.as_deref().map(mask_secret),
        }
    }
}

#[derive(Deserialize)]
struct RawSecretSet {
    primary_secret: String,
    #[serde(default)]
    secondary_secret: Option<String>,
}

impl TryFrom<RawSecretSet> for WebhookSecretSet {
    type Error = EzThrottleError;

    fn try_from(raw: RawSecretSet) -> Result<Self, Self::Error> {
        let set = Self::new(raw.primary_secret)?;
        match raw.secondary_secret {
            Some(secondary) => set.with_secondary(secondary),
            None => Ok(set),
        }
    }
}

impl std::fmt::Debug for WebhookSecretSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = self.masked();
        f.debug_struct("WebhookSecretSet")
            .field("primary_secret", &masked.primary_secret)
            .field("secondary_secret", &masked.secondary_secret)
            .finish()
    }
}

fn check_len(which: &str, secret: &str) -> Result<(), EzThrottleError> {
    let len = secret.chars().count();
    if len < MIN_SECRET_LEN {
        return Err(EzThrottleError::InvalidSecret(format!(
            "{which} secret must be at least {MIN_SECRET_LEN} characters (got {len})"
        )));
    }
    Ok(())
}

/// A secret pair with all but the last four characters hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedSecretSet {
    /// Masked primary secret.
    pub primary_secret: String,
    /// Masked secondary secret, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_secret: Option<String>,
}

/// Masks a secret, keeping only its last four characters.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{visible}", "*".repeat(chars.len() - 4))
}
