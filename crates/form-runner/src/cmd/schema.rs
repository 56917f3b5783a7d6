use anyhow::Result;

use form_spec::template_schema;

pub fn run() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&template_schema())?);
    Ok(())
}
