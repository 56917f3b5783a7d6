use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use form_spec::{FormTemplate, check_template};

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Template document to check
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,
}

pub fn run(args: &CheckArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.template)
        .with_context(|| format!("failed to read {}", args.template.display()))?;
    let template: FormTemplate = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a form template", args.template.display()))?;
    if let Err(err) = check_template(&template) {
        bail!("{}: {err}", args.template.display());
    }
    println!(
        "ok: {} ({} fields)",
        template.identity,
        template.fields.len()
    );
    Ok(())
}
