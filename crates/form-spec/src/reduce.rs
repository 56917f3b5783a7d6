use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use regex::Regex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::FieldError;
use crate::template::{AutoSource, Constraint, FormField, FormTemplate, QuestionType, RenderId};

/// Submittable mapping from response key to value.
pub type FlatResponse = BTreeMap<String, String>;

/// Supplies system-computed ("auto") values.
pub trait AutoValues: Send + Sync {
    fn compute(&self, source: AutoSource, field: &FormField) -> Option<String>;
}

/// Auto values captured once when a session opens.
#[derive(Debug, Clone, Default)]
pub struct SessionAutoValues {
    values: BTreeMap<AutoSource, String>,
}

impl SessionAutoValues {
    /// Captures the current time as the session timestamp.
    pub fn now() -> Self {
        let stamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self::default().with(AutoSource::Timestamp, stamp)
    }

    pub fn with(mut self, source: AutoSource, value: impl Into<String>) -> Self {
        self.values.insert(source, value.into());
        self
    }
}

impl AutoValues for SessionAutoValues {
    fn compute(&self, source: AutoSource, _field: &FormField) -> Option<String> {
        self.values.get(&source).cloned()
    }
}

/// Resolves captured media to an opaque reference.
pub trait AttachmentResolver: Send + Sync {
    fn reference(&self, field: &FormField, raw: &str) -> String;
}

/// Derives `att:<blake3>` references from capture handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestAttachments;

pub const ATTACHMENT_PREFIX: &str = "att:";

impl AttachmentResolver for DigestAttachments {
    fn reference(&self, _field: &FormField, raw: &str) -> String {
        if raw.starts_with(ATTACHMENT_PREFIX) {
            return raw.to_string();
        }
        format!(
            "{}{}",
            ATTACHMENT_PREFIX,
            blake3::hash(raw.as_bytes()).to_hex()
        )
    }
}

/// Reducer output. Errors never stop the reduction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reduction {
    pub response: FlatResponse,
    pub errors: Vec<FieldError>,
}

impl Reduction {
    pub fn is_submittable(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walks render state into a flat response and validates it.
pub struct ResponseReducer {
    auto: Box<dyn AutoValues>,
    attachments: Box<dyn AttachmentResolver>,
    /// Constraint patterns compiled on first use.
    patterns: Mutex<BTreeMap<String, Regex>>,
}

impl Default for ResponseReducer {
    fn default() -> Self {
        Self::new(SessionAutoValues::default(), DigestAttachments)
    }
}

impl ResponseReducer {
    pub fn new(
        auto: impl AutoValues + 'static,
        attachments: impl AttachmentResolver + 'static,
    ) -> Self {
        Self {
            auto: Box::new(auto),
            attachments: Box::new(attachments),
            patterns: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn reduce(
        &self,
        rendered: &BTreeMap<RenderId, &FormField>,
        template: &FormTemplate,
    ) -> Reduction {
        let mut response = FlatResponse::new();
        let mut errors = Vec::new();
        let mut rendered_fields = BTreeSet::new();

        for (render_id, field) in rendered {
            rendered_fields.insert(field.field_id.as_str());
            let value = self.final_value(field);
            if let Some((message, code)) = self.check_value(field, &value) {
                errors.push(FieldError {
                    render_id: *render_id,
                    qnum: field.qnum,
                    field_id: field.field_id.clone(),
                    key: field.response_key(),
                    message,
                    code: code.into(),
                });
            }
            response.insert(field.response_key(), value);
        }

        for field in &template.fields {
            if rendered_fields.contains(field.field_id.as_str()) {
                continue;
            }
            if let Some(source) = field.auto
                && let Some(value) = self.auto.compute(source, field)
            {
                response.insert(field.response_key(), value);
            }
        }

        Reduction { response, errors }
    }

    fn final_value(&self, field: &FormField) -> String {
        let raw = field.current_value.trim();
        if field.question_type.is_image_bearing() && !raw.is_empty() {
            return self.attachments.reference(field, raw);
        }
        if raw.is_empty()
            && let Some(source) = field.auto
        {
            return self.auto.compute(source, field).unwrap_or_default();
        }
        field.current_value.clone()
    }
}

impl std::fmt::Debug for ResponseReducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseReducer").finish_non_exhaustive()
    }
}

impl ResponseReducer {
    fn check_value(&self, field: &FormField, value: &str) -> Option<(String, &'static str)> {
        let value = value.trim();
        if value.is_empty() {
            return field
                .required
                .then(|| ("this field is required".to_string(), "missing_required"));
        }

        if field.is_loop_head()
            && let Some(message) = field.error_message.clone()
        {
            return Some((message, "invalid_count"));
        }

        let number = match field.question_type {
            QuestionType::Numeric => match value.parse::<f64>() {
                Ok(number) => Some(number),
                Err(_) => return Some(("enter a number".into(), "not_a_number")),
            },
            QuestionType::MultipleChoice => {
                if !field.choices.iter().any(|choice| choice.value == value) {
                    return Some(("choose one of the listed options".into(), "invalid_choice"));
                }
                None
            }
            _ => None,
        };

        field
            .constraint
            .as_ref()
            .and_then(|constraint| self.enforce_constraint(constraint, value, number))
    }

    fn enforce_constraint(
        &self,
        constraint: &Constraint,
        value: &str,
        number: Option<f64>,
    ) -> Option<(String, &'static str)> {
        if let Some(pattern) = &constraint.pattern {
            let Some(regex) = self.compiled(pattern) else {
                return Some((format!("pattern '{pattern}' does not compile"), "invalid_pattern"));
            };
            if !regex.is_match(value) {
                return Some(("value does not match the expected format".into(), "pattern_mismatch"));
            }
        }

        if let Some(max_len) = constraint.max_len
            && value.chars().count() > max_len
        {
            return Some((format!("at most {max_len} characters"), "too_long"));
        }

        if let Some(min) = constraint.min
            && let Some(number) = number
            && number < min
        {
            return Some((format!("must be at least {min}"), "below_minimum"));
        }

        if let Some(max) = constraint.max
            && let Some(number) = number
            && number > max
        {
            return Some((format!("must be at most {max}"), "above_maximum"));
        }

        None
    }

    /// Compiles `pattern` once per reducer; `None` when it is not a valid regex.
    fn compiled(&self, pattern: &str) -> Option<Regex> {
        let mut cache = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = cache.get(pattern) {
            return Some(regex.clone());
        }
        let regex = Regex::new(pattern).ok()?;
        cache.insert(pattern.to_string(), regex.clone());
        Some(regex)
    }
}
