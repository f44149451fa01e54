//! Declarative payload validation.
//!
//! Rules are a table from [`Method`] to per-field checks. Every field is
//! checked and reports its first violation; all messages are joined with `"; "`.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tonic::Status;
use tracing::debug;
use uuid::Uuid;

use super::{Call, CallResult, Interceptor, Method, Next, Payload};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const SPECIAL_CHARS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;
const STRONG_MIN_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Required,
    Email,
    MinLen(usize),
    MaxLen(usize),
    EqualTo(&'static str),
    Strong,
    Uuid,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub field: &'static str,
    pub checks: &'static [Check],
}

const fn rule(field: &'static str, checks: &'static [Check]) -> FieldRule {
    FieldRule { field, checks }
}

const EMAIL: &[Check] = &[Check::Required, Check::Email, Check::MinLen(5), Check::MaxLen(255)];
const NEW_SECRET: &[Check] = &[Check::Required, Check::Strong];
const REQUIRED: &[Check] = &[Check::Required];

const RULES: &[(Method, &[FieldRule])] = &[
    (
        Method::Register,
        &[
            rule("email", EMAIL),
            rule("password", NEW_SECRET),
            rule("password_confirm", &[Check::Required, Check::EqualTo("password")]),
        ],
    ),
    (
        Method::Login,
        &[rule("email", EMAIL), rule("password", REQUIRED)],
    ),
    (Method::Logout, &[rule("access_token", REQUIRED)]),
    (Method::RefreshToken, &[rule("refresh_token", REQUIRED)]),
    (Method::ValidateToken, &[rule("token", REQUIRED)]),
    (
        Method::CreateUser,
        &[
            rule("email", EMAIL),
            rule("password", NEW_SECRET),
            rule("password_confirm", &[Check::Required, Check::EqualTo("password")]),
        ],
    ),
    (
        Method::GetUserById,
        &[rule("user_id", &[Check::Required, Check::Uuid])],
    ),
    (
        Method::GetUserByEmail,
        &[rule("email", &[Check::Required, Check::Email])],
    ),
    (
        Method::UpdateUserPassword,
        &[
            rule("id", &[Check::Required, Check::Uuid]),
            rule("old_password", REQUIRED),
            rule("new_password", NEW_SECRET),
            rule(
                "new_password_confirm",
                &[Check::Required, Check::EqualTo("new_password")],
            ),
        ],
    ),
];

/// True for at least 8 chars with an uppercase letter, a digit and a symbol.
#[must_use]
pub fn is_strong(secret: &str) -> bool {
    secret.chars().count() >= STRONG_MIN_LEN
        && secret.chars().any(|c| c.is_ascii_uppercase())
        && secret.chars().any(|c| c.is_ascii_digit())
        && secret.chars().any(|c| SPECIAL_CHARS.contains(c))
}

#[derive(Clone, Debug)]
pub struct Validation {
    rules: HashMap<Method, &'static [FieldRule]>,
    email: Regex,
}

impl Validation {
    /// # Errors
    /// Fails if the email pattern does not compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            rules: RULES.iter().copied().collect(),
            email: Regex::new(EMAIL_PATTERN)?,
        })
    }

    fn violation(&self, payload: &Payload, field: &str, value: &str, check: Check) -> Option<String> {
        let ok = match check {
            Check::Required => !value.is_empty(),
            Check::Email => self.email.is_match(value),
            Check::MinLen(n) => value.chars().count() >= n,
            Check::MaxLen(n) => value.chars().count() <= n,
            Check::EqualTo(other) => payload.field(other) == Some(value),
            Check::Strong => is_strong(value),
            Check::Uuid => Uuid::parse_str(value).is_ok(),
        };
        if ok {
            return None;
        }

        Some(match check {
            Check::Required => format!("{field} is required"),
            Check::Email => format!("{field} must be a valid email address"),
            Check::MinLen(n) => format!("{field} must be at least {n} characters"),
            Check::MaxLen(n) => format!("{field} must be at most {n} characters"),
            Check::EqualTo(other) => format!("{field} must be equal to {other}"),
            Check::Strong => format!(
                "weak {field} - must contain uppercase letters, numbers and special characters, at least {STRONG_MIN_LEN} characters"
            ),
            Check::Uuid => format!("{field} must be a valid UUID"),
        })
    }

    /// Every violated field, in table order. Methods without rules always pass.
    #[must_use]
    pub fn violations(&self, payload: &Payload) -> Vec<String> {
        let Some(rules) = self.rules.get(&payload.method()) else {
            return Vec::new();
        };

        rules
            .iter()
            .filter_map(|rule| {
                let value = payload.field(rule.field).unwrap_or_default();
                rule.checks
                    .iter()
                    .find_map(|&check| self.violation(payload, rule.field, value, check))
            })
            .collect()
    }
}

#[async_trait]
impl Interceptor for Validation {
    async fn intercept(&self, call: Call, next: Next<'_>) -> CallResult {
        let violations = self.violations(&call.payload);
        if !violations.is_empty() {
            let message = violations.join("; ");
            debug!(method = %call.method(), "validation failed: {}", message);
            return Err(Status::invalid_argument(message).into());
        }

        next.run(call).await
    }
}
