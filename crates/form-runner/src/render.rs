use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;

use form_session::FieldRenderer;
use form_spec::FormField;

/// Answers looked up by response key, then qnum, then field id.
#[derive(Debug, Clone, Default)]
pub struct AnswersRenderer {
    answers: BTreeMap<String, String>,
}

impl AnswersRenderer {
    pub fn new(answers: BTreeMap<String, String>) -> Self {
        Self { answers }
    }
}

#[async_trait]
impl FieldRenderer for AnswersRenderer {
    async fn render(&self, field: &FormField, read_only: bool) -> Result<Option<String>> {
        if read_only {
            return Ok(None);
        }
        Ok(self
            .answers
            .get(&field.response_key())
            .or_else(|| self.answers.get(&field.qnum.to_string()))
            .or_else(|| self.answers.get(&field.field_id))
            .cloned())
    }
}

/// Prompts on stderr and reads one line of stdin per field. An empty line
/// keeps the shown value; end of input leaves the field unanswered.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptRenderer;

#[async_trait]
impl FieldRenderer for PromptRenderer {
    async fn render(&self, field: &FormField, read_only: bool) -> Result<Option<String>> {
        let prompt = prompt_for(field, read_only);
        if read_only {
            eprintln!("{prompt}");
            return Ok(None);
        }
        let current = field.current_value.clone();
        let line = tokio::task::spawn_blocking(move || read_line(&prompt))
            .await
            .context("prompt task failed")??;
        Ok(match line {
            None => None,
            Some(input) if input.is_empty() => (!current.is_empty()).then_some(current),
            Some(input) => Some(input),
        })
    }
}

fn prompt_for(field: &FormField, read_only: bool) -> String {
    let label = if field.label.is_empty() {
        field.field_id.as_str()
    } else {
        field.label.as_str()
    };
    let mut prompt = format!("[{}] {}", field.response_key(), label);
    if !field.choices.is_empty() {
        let choices: Vec<_> = field.choices.iter().map(|c| c.value.as_str()).collect();
        prompt.push_str(&format!(" ({})", choices.join("/")));
    }
    if let Some(error) = &field.error_message {
        prompt.push_str(&format!(" !{error}"));
    }
    if read_only {
        prompt.push_str(&format!(": {}", field.current_value));
    } else if field.current_value.is_empty() {
        prompt.push_str(": ");
    } else {
        prompt.push_str(&format!(" [{}]: ", field.current_value));
    }
    prompt
}

fn read_line(prompt: &str) -> Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
