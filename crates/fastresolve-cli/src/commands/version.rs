use fastresolve_core::version::{version_string, SCHEMA_VERSION, VERSION};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
struct VersionInfo<'a> {
    schema_version: u32,
    name: &'a str,
    version: &'a str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        let info = VersionInfo {
            schema_version: SCHEMA_VERSION,
            name: "fastresolve",
            version: VERSION,
        };
        println!("{}", serde_json::to_string_pretty(&info).into_diagnostic()?);
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
