use crate::config::Config;
use crate::engine::verdict::verdict_schema;
use schemars::schema_for;

pub fn execute() -> anyhow::Result<()> {
    let schema = schema_for!(Config);
    let json = serde_json::to_string_pretty(&schema)?;
    println!("{}", json);
    Ok(())
}

pub fn execute_verdict() -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&verdict_schema().schema)?;
    println!("{}", json);
    Ok(())
}
