//! Table-driven field rules.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::schema::{Entity, FieldSelector, FieldValue};
use crate::types::{Failure, Outcome};

use super::Validator;

type Predicate = Arc<dyn Fn(&FieldValue) -> bool + Send + Sync>;

/// A single check applied to one field value.
///
/// Every check except [`Check::NotEmpty`] and [`Check::NotNull`] passes on
/// null, so that optional fields are only checked when present.
#[derive(Clone)]
pub enum Check {
    /// Not null, and not blank when text.
    NotEmpty,
    /// Not null.
    NotNull,
    /// Text length in characters within `min..=max`.
    Length { min: usize, max: usize },
    /// Text matches the pattern.
    Pattern(Regex),
    /// Text looks like an email address.
    Email,
    /// Number within `min..=max`.
    Range { min: f64, max: f64 },
    /// Caller-supplied predicate with its failure message.
    Custom { message: String, predicate: Predicate },
}

impl Check {
    /// Returns a failure message when `value` fails the check.
    fn evaluate(&self, name: &str, value: &FieldValue) -> Option<String> {
        match (self, value) {
            (Check::NotEmpty, FieldValue::Null) | (Check::NotNull, FieldValue::Null) => {
                Some(format!("'{}' must not be empty.", name))
            }
            (Check::NotEmpty, FieldValue::Text(s)) if s.trim().is_empty() => {
                Some(format!("'{}' must not be empty.", name))
            }
            (Check::Custom { message, predicate }, v) => {
                (!predicate(v)).then(|| message.clone())
            }
            (_, FieldValue::Null) => None,
            (Check::Length { min, max }, FieldValue::Text(s)) => {
                let len = s.chars().count();
                (len < *min || len > *max).then(|| {
                    format!(
                        "'{}' must be between {} and {} characters. You entered {} characters.",
                        name, min, max, len
                    )
                })
            }
            (Check::Pattern(pattern), FieldValue::Text(s)) => (!pattern.is_match(s))
                .then(|| format!("'{}' is not in the correct format.", name)),
            (Check::Email, FieldValue::Text(s)) => (!looks_like_email(s))
                .then(|| format!("'{}' is not a valid email address.", name)),
            (Check::Range { min, max }, FieldValue::Integer(_) | FieldValue::Float(_)) => {
                let n = match value {
                    FieldValue::Integer(i) => *i as f64,
                    FieldValue::Float(f) => *f,
                    _ => return None,
                };
                (n < *min || n > *max).then(|| {
                    format!(
                        "'{}' must be between {} and {}. You entered {}.",
                        name, min, max, value
                    )
                })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::NotEmpty => write!(f, "NotEmpty"),
            Check::NotNull => write!(f, "NotNull"),
            Check::Length { min, max } => write!(f, "Length({}..={})", min, max),
            Check::Pattern(p) => write!(f, "Pattern({})", p.as_str()),
            Check::Email => write!(f, "Email"),
            Check::Range { min, max } => write!(f, "Range({}..={})", min, max),
            Check::Custom { message, .. } => write!(f, "Custom({:?})", message),
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}

struct Rule<E: 'static> {
    field: FieldSelector<E>,
    check: Check,
    message: Option<String>,
}

/// A validator built from per-field rules.
///
/// All rules run; failures are reported in rule order.
///
/// # Example
///
/// ```ignore
/// let validator = RuleValidator::new()
///     .not_empty(User::field("email")?)
///     .email(User::field("email")?)
///     .length(User::field("name")?, 1, 100);
/// ```
pub struct RuleValidator<E: 'static> {
    rules: Vec<Rule<E>>,
}

impl<E: Entity> Default for RuleValidator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> RuleValidator<E> {
    /// Creates a validator with no rules.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule.
    pub fn rule(mut self, field: FieldSelector<E>, check: Check) -> Self {
        self.rules.push(Rule {
            field,
            check,
            message: None,
        });
        self
    }

    /// Replaces the failure message of the most recently added rule.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Some(rule) = self.rules.last_mut() {
            rule.message = Some(message.into());
        }
        self
    }

    /// The field must be present and, for text, not blank.
    pub fn not_empty(self, field: FieldSelector<E>) -> Self {
        self.rule(field, Check::NotEmpty)
    }

    /// The field must be present.
    pub fn not_null(self, field: FieldSelector<E>) -> Self {
        self.rule(field, Check::NotNull)
    }

    /// Text length must be within `min..=max` characters.
    pub fn length(self, field: FieldSelector<E>, min: usize, max: usize) -> Self {
        self.rule(field, Check::Length { min, max })
    }

    /// Text length must not exceed `max` characters.
    pub fn max_length(self, field: FieldSelector<E>, max: usize) -> Self {
        self.rule(field, Check::Length { min: 0, max })
    }

    /// Text must match `pattern`.
    pub fn matches(self, field: FieldSelector<E>, pattern: Regex) -> Self {
        self.rule(field, Check::Pattern(pattern))
    }

    /// Text must look like an email address.
    pub fn email(self, field: FieldSelector<E>) -> Self {
        self.rule(field, Check::Email)
    }

    /// Numbers must be within `min..=max`.
    pub fn range(self, field: FieldSelector<E>, min: f64, max: f64) -> Self {
        self.rule(field, Check::Range { min, max })
    }

    /// The value must satisfy `predicate`.
    pub fn must<F>(self, field: FieldSelector<E>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FieldValue) -> bool + Send + Sync + 'static,
    {
        self.rule(
            field,
            Check::Custom {
                message: message.into(),
                predicate: Arc::new(predicate),
            },
        )
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn run<'a>(&'a self, entity: &E, rules: impl Iterator<Item = &'a Rule<E>>) -> Outcome {
        let mut outcome = Outcome::empty();
        for rule in rules {
            let value = rule.field.get(entity);
            if let Some(message) = rule.check.evaluate(rule.field.name(), &value) {
                outcome.push(Failure::new(
                    rule.field.name(),
                    rule.message.clone().unwrap_or(message),
                    value,
                ));
            }
        }
        outcome
    }
}

impl<E: Entity> fmt::Debug for RuleValidator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for rule in &self.rules {
            list.entry(&format_args!("{} {:?}", rule.field, rule.check));
        }
        list.finish()
    }
}

#[async_trait]
impl<E: Entity> Validator<E> for RuleValidator<E> {
    async fn validate(&self, entity: &E) -> Outcome {
        self.run(entity, self.rules.iter())
    }

    async fn validate_field(&self, entity: &E, field: FieldSelector<E>) -> Outcome {
        self.run(entity, self.rules.iter().filter(|r| r.field == field))
    }
}
