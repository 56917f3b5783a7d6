use std::collections::BTreeSet;

use regex::Regex;

use crate::error::FormError;
use crate::template::{FormField, FormTemplate, QuestionType};

/// Rejects templates that cannot be executed. Runs once at screen entry,
/// before anything is rendered.
pub fn check_template(template: &FormTemplate) -> Result<(), FormError> {
    let form_id = template.identity.form_id.as_str();
    if template.fields.is_empty() {
        return Err(FormError::invalid(form_id, "template has no fields"));
    }

    let mut seen_ids = BTreeSet::new();
    for (index, field) in template.fields.iter().enumerate() {
        if !seen_ids.insert(field.field_id.as_str()) {
            return Err(FormError::invalid(
                form_id,
                format!("duplicate field id '{}'", field.field_id),
            ));
        }

        if field.question_type == QuestionType::MultipleChoice && field.choices.is_empty() {
            return Err(FormError::invalid(
                form_id,
                format!("multiple choice qnum {} has no choices", field.qnum),
            ));
        }

        if let Some(pattern) = field
            .constraint
            .as_ref()
            .and_then(|constraint| constraint.pattern.as_deref())
            && let Err(err) = Regex::new(pattern)
        {
            return Err(FormError::invalid(
                form_id,
                format!("qnum {} has an invalid pattern: {err}", field.qnum),
            ));
        }

        for target in branch_targets(field) {
            if target == field.qnum {
                return Err(FormError::invalid(
                    form_id,
                    format!("qnum {} branches to itself", field.qnum),
                ));
            }
            if !template.fields.iter().any(|other| other.qnum == target) {
                return Err(FormError::UnresolvedBranchTarget {
                    target,
                    from: field.qnum,
                });
            }
            if !template.fields[index + 1..]
                .iter()
                .any(|other| other.qnum == target)
            {
                return Err(FormError::invalid(
                    form_id,
                    format!(
                        "qnum {} branches backwards to qnum {}",
                        field.qnum, target
                    ),
                ));
            }
        }

        if let Some(end) = field.loop_end_qnum {
            if end == field.qnum {
                return Err(FormError::invalid(
                    form_id,
                    format!("loop at qnum {} has an empty body", field.qnum),
                ));
            }
            if field.question_type != QuestionType::Numeric {
                return Err(FormError::invalid(
                    form_id,
                    format!("loop head qnum {} must be numeric", field.qnum),
                ));
            }
            if !template.fields[index + 1..]
                .iter()
                .any(|other| other.qnum == end)
            {
                return Err(FormError::UnresolvedLoopEnd {
                    end,
                    head: field.qnum,
                });
            }
        }
    }

    Ok(())
}

fn branch_targets(field: &FormField) -> BTreeSet<u32> {
    field
        .choices
        .iter()
        .filter_map(|choice| choice.branch_target_qnum)
        .chain(field.branch_target_qnum)
        .collect()
}
