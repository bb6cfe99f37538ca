//! Validate content without writing anything

use anyhow::Result;
use clap::ValueEnum;

use crate::content::{LinkValidator, ValidationReport};
use crate::Site;

/// How the broken reference report is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Scan, parse, register and validate. Parse and registration failures are
/// errors; broken references only fail the check in strict mode.
pub fn run(site: &Site, strict: bool, format: ReportFormat) -> Result<ValidationReport> {
    let registry = super::load_registry(site)?;
    let report = LinkValidator::new(&site.config).validate(&registry);

    println!("{}", format_report(&report, format)?);

    if strict || site.config.strict {
        report.enforce(true)?;
    }
    Ok(report)
}

pub fn format_report(report: &ValidationReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ReportFormat::Text if report.is_clean() => Ok("No broken references".to_string()),
        ReportFormat::Text => {
            let mut out = format!("Broken references ({}):", report.len());
            for broken in &report.broken {
                out.push_str(&format!("\n  {}", broken));
            }
            Ok(out)
        }
    }
}
