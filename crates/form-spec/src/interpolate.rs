use handlebars::Handlebars;
use serde_json::{Map, Value};

use crate::error::FormError;
use crate::template::Qnum;

/// Modes describing how unresolvable placeholders are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Missing values emit an error.
    Strict,
    /// Missing values leave the default untouched.
    Relaxed,
}

/// Values available to a default while a loop is expanded.
#[derive(Debug, Clone, Copy)]
pub struct IterationContext {
    /// 1-based index of the iteration being produced.
    pub iteration: u32,
    pub qnum: Qnum,
}

impl IterationContext {
    fn to_value(self) -> Value {
        let mut map = Map::new();
        map.insert("iteration".into(), Value::from(self.iteration));
        map.insert(
            "iteration_index".into(),
            Value::from(self.iteration.saturating_sub(1)),
        );
        map.insert("qnum".into(), Value::from(self.qnum));
        Value::Object(map)
    }
}

/// Handlebars-backed interpolation of per-iteration defaults.
pub struct DefaultInterpolator {
    handlebars: Handlebars<'static>,
    mode: ResolutionMode,
}

impl DefaultInterpolator {
    pub fn new(mode: ResolutionMode) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars, mode }
    }

    /// Resolve `template` against the iteration context. Plain text passes
    /// through untouched.
    pub fn resolve(&self, template: &str, ctx: IterationContext) -> Result<String, FormError> {
        if !template.contains("{{") {
            return Ok(template.to_owned());
        }
        match self.handlebars.render_template(template, &ctx.to_value()) {
            Ok(result) => Ok(result),
            Err(err) => match self.mode {
                ResolutionMode::Relaxed => Ok(template.to_owned()),
                ResolutionMode::Strict => Err(FormError::Interpolation(err.to_string())),
            },
        }
    }
}

impl Default for DefaultInterpolator {
    fn default() -> Self {
        Self::new(ResolutionMode::Relaxed)
    }
}

impl std::fmt::Debug for DefaultInterpolator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultInterpolator")
            .field("mode", &self.mode)
            .finish()
    }
}
