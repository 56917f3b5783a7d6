use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Question address used by branch and loop targets.
pub type Qnum = u32;

/// Runtime identity of one rendered field instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct RenderId(pub u64);

impl fmt::Display for RenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Supported question data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Numeric,
    Date,
    Time,
    DateTime,
    MultipleChoice,
    Image,
    Signature,
    Barcode,
    Composite,
}

impl QuestionType {
    /// Whether answers carry captured media rather than text.
    pub fn is_image_bearing(self) -> bool {
        matches!(self, QuestionType::Image | QuestionType::Signature)
    }
}

/// System-computed value sources for "auto" fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AutoSource {
    Timestamp,
    Driver,
    Vehicle,
    Dispatch,
    Stop,
    Action,
}

/// Constraints that can be enforced per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// One selectable option of a multiple choice field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormChoice {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_target_qnum: Option<Qnum>,
}

impl FormChoice {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            branch_target_qnum: None,
        }
    }

    pub fn jumping_to(value: impl Into<String>, target: Qnum) -> Self {
        Self {
            value: value.into(),
            branch_target_qnum: Some(target),
        }
    }
}

/// A question definition, and at runtime one rendered instance of it.
///
/// The runtime fields (`current_value`, `render_id`, `error_message`,
/// `iteration_path`) are empty in a freshly fetched template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormField {
    pub field_id: String,
    pub qnum: Qnum,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_target_qnum: Option<Qnum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end_qnum: Option<Qnum>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<FormChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<AutoSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
    #[serde(default)]
    pub current_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_id: Option<RenderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iteration_path: Vec<u32>,
}

impl FormField {
    pub fn new(field_id: impl Into<String>, qnum: Qnum, question_type: QuestionType) -> Self {
        Self {
            field_id: field_id.into(),
            qnum,
            question_type,
            label: String::new(),
            required: false,
            branch_target_qnum: None,
            loop_end_qnum: None,
            choices: Vec::new(),
            default_value: None,
            auto: None,
            constraint: None,
            current_value: String::new(),
            render_id: None,
            error_message: None,
            iteration_path: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices(mut self, choices: Vec<FormChoice>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    pub fn looping_to(mut self, end: Qnum) -> Self {
        self.loop_end_qnum = Some(end);
        self
    }

    pub fn jumping_to(mut self, target: Qnum) -> Self {
        self.branch_target_qnum = Some(target);
        self
    }

    pub fn with_auto(mut self, source: AutoSource) -> Self {
        self.auto = Some(source);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Loop heads take the iteration count as their answer.
    pub fn is_loop_head(&self) -> bool {
        self.loop_end_qnum.is_some()
    }

    /// Multiple choice fields whose answer can redirect the sequence.
    pub fn is_branch_point(&self) -> bool {
        self.question_type == QuestionType::MultipleChoice
            && (self.branch_target_qnum.is_some()
                || self
                    .choices
                    .iter()
                    .any(|choice| choice.branch_target_qnum.is_some()))
    }

    /// Fields that halt auto-advance until answered.
    pub fn awaits_input(&self) -> bool {
        self.is_loop_head() || self.is_branch_point()
    }

    /// Jump target selected by `value`: the matching choice's target wins over
    /// the field-level target.
    pub fn chosen_target(&self, value: &str) -> Option<Qnum> {
        self.choices
            .iter()
            .find(|choice| choice.value == value)
            .and_then(|choice| choice.branch_target_qnum)
            .or(self.branch_target_qnum)
    }

    /// Key of this instance in the flat response.
    pub fn response_key(&self) -> String {
        if self.iteration_path.is_empty() {
            self.qnum.to_string()
        } else {
            let path = self
                .iteration_path
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join("_");
            format!("{}_{}", self.qnum, path)
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.render_id.is_some()
    }

    /// Drops everything assigned at render time.
    pub(crate) fn reset_runtime(&mut self) {
        self.current_value.clear();
        self.render_id = None;
        self.error_message = None;
    }
}

/// Identity of a template as addressed by the template source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FormIdentity {
    pub customer: String,
    pub form_id: String,
    pub form_class: String,
}

impl FormIdentity {
    pub fn new(
        customer: impl Into<String>,
        form_id: impl Into<String>,
        form_class: impl Into<String>,
    ) -> Self {
        Self {
            customer: customer.into(),
            form_id: form_id.into(),
            form_class: form_class.into(),
        }
    }
}

impl fmt::Display for FormIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.customer, self.form_class, self.form_id)
    }
}

/// Dispatcher-authored form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormTemplate {
    pub identity: FormIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub is_driver_editable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predefined_recipients: Vec<String>,
    pub fields: Vec<FormField>,
}

impl FormTemplate {
    pub fn new(identity: FormIdentity, fields: Vec<FormField>) -> Self {
        Self {
            identity,
            title: None,
            is_driver_editable: false,
            predefined_recipients: Vec::new(),
            fields,
        }
    }

    /// Single free-text field template used in place of the primary form.
    pub fn freeform(identity: FormIdentity) -> Self {
        let field = FormField::new("freeform", 1, QuestionType::Text)
            .with_label("Reply")
            .required();
        Self::new(identity, vec![field])
    }
}

/// How a dispatch action links a reply form to its primary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    NoReply,
    ReplyWithSame,
    ReplyWithNew,
    ReplyWithFreeform,
}

/// Per-action reply configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReplyPolicy {
    pub kind: ReplyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<FormIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<FormIdentity>,
}

impl ReplyPolicy {
    pub fn new(kind: ReplyKind, primary: FormIdentity) -> Self {
        Self {
            kind,
            primary: Some(primary),
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: FormIdentity) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// JSON schema describing template documents.
pub fn template_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(FormTemplate)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_target_wins_over_field_target() {
        let field = FormField::new("f1", 1, QuestionType::MultipleChoice)
            .with_choices(vec![FormChoice::new("A"), FormChoice::jumping_to("B", 5)])
            .jumping_to(3);
        assert_eq!(field.chosen_target("B"), Some(5));
        assert_eq!(field.chosen_target("A"), Some(3));
        assert!(field.is_branch_point());
    }

    #[test]
    fn response_key_includes_iteration_path() {
        let mut field = FormField::new("f5", 5, QuestionType::Text);
        assert_eq!(field.response_key(), "5");
        field.iteration_path = vec![2, 1];
        assert_eq!(field.response_key(), "5_2_1");
    }
}
