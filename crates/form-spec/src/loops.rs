use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::interpolate::{DefaultInterpolator, IterationContext};
use crate::template::{FormField, Qnum, RenderId};

/// Upper bound on the iteration count a loop head accepts.
pub const MAX_LOOP_ITERATIONS: u32 = 99;

/// One expanded loop, kept on the state's frame stack so a re-answered head
/// can restore its original body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LoopFrame {
    pub head_render_id: RenderId,
    pub head_qnum: Qnum,
    /// First index of the expanded copies in the working sequence.
    pub range_start: usize,
    /// One past the last expanded copy.
    pub range_end: usize,
    pub iterations: u32,
    pub iteration_index: u32,
    pub iterations_remaining: u32,
    pub body: Vec<FormField>,
}

impl LoopFrame {
    pub fn contains(&self, index: usize) -> bool {
        self.range_start <= index && index < self.range_end
    }
}

/// Replays a contiguous field range with per-iteration defaults.
#[derive(Debug, Default)]
pub struct LoopExpander {
    interpolator: DefaultInterpolator,
}

impl LoopExpander {
    pub fn new(interpolator: DefaultInterpolator) -> Self {
        Self { interpolator }
    }

    /// Produces `iterations` back-to-back copies of `body`. Copies carry no
    /// render id; the cursor assigns fresh ids as it reaches them.
    pub fn expand(&self, body: &[FormField], iterations: u32) -> Result<Vec<FormField>, FormError> {
        let mut out = Vec::with_capacity(body.len() * iterations as usize);
        for iteration in 1..=iterations {
            for field in body {
                let mut copy = field.clone();
                copy.reset_runtime();
                copy.iteration_path.push(iteration);
                copy.default_value = field
                    .default_value
                    .as_deref()
                    .map(|value| {
                        self.interpolator.resolve(
                            value,
                            IterationContext {
                                iteration,
                                qnum: field.qnum,
                            },
                        )
                    })
                    .transpose()?;
                out.push(copy);
            }
        }
        Ok(out)
    }
}

/// Parses a loop head answer into an iteration count.
pub fn parse_iterations(value: &str, max: Option<f64>) -> Result<u32, String> {
    let count = value
        .trim()
        .parse::<u32>()
        .map_err(|_| "enter a whole number of repetitions".to_string())?;
    let limit = max
        .filter(|max| *max >= 0.0)
        .map(|max| (max as u32).min(MAX_LOOP_ITERATIONS))
        .unwrap_or(MAX_LOOP_ITERATIONS);
    if count > limit {
        return Err(format!("at most {limit} repetitions are allowed"));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::QuestionType;

    #[test]
    fn expansion_interpolates_defaults_per_iteration() {
        let body = vec![
            FormField::new("f5", 5, QuestionType::Text).with_default("Pallet {{iteration}}"),
            FormField::new("f6", 6, QuestionType::Numeric),
        ];
        let copies = LoopExpander::default().expand(&body, 2).unwrap();
        let summary: Vec<_> = copies
            .iter()
            .map(|field| (field.qnum, field.iteration_path.clone(), field.default_value.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (5, vec![1], Some("Pallet 1".to_string())),
                (6, vec![1], None),
                (5, vec![2], Some("Pallet 2".to_string())),
                (6, vec![2], None),
            ]
        );
    }

    #[test]
    fn iteration_counts_are_bounded() {
        assert_eq!(parse_iterations(" 3 ", None), Ok(3));
        assert!(parse_iterations("three", None).is_err());
        assert!(parse_iterations("-1", None).is_err());
        assert!(parse_iterations("100", None).is_err());
        assert!(parse_iterations("5", Some(4.0)).is_err());
    }
}
