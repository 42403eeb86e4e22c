//! List command implementation

use anyhow::{Context, Result};
use colored::*;
use tg_testing::{filter_units, validate_pattern, TestDiscovery, TestUnit};

use crate::config::TgConfig;
use crate::utils::{format_timestamp, print_warning, TableBuilder};

/// Print the tests a run would execute, in run order.
pub fn list_command(config: &TgConfig, pattern: Option<&str>) -> Result<bool> {
    if let Some(pattern) = pattern {
        validate_pattern(pattern)?;
    }

    let discovery = TestDiscovery::new(config.discovery.clone());
    let outcome = discovery
        .discover()
        .with_context(|| format!("Failed to discover tests in {}", config.discovery.root.display()))?;

    for warning in &outcome.warnings {
        print_warning(&format!("skipped {}: {}", warning.path.display(), warning.message));
    }

    let units = filter_units(&outcome.units, pattern);
    if units.is_empty() {
        println!("{}", "No tests found!".yellow());
        return Ok(true);
    }

    unit_table(&units).print();
    println!();
    println!("{} {}", units.len().to_string().bold(), "tests".bold());
    Ok(true)
}

fn unit_table(units: &[TestUnit]) -> TableBuilder {
    units.iter().fold(
        TableBuilder::new().headers(&["Name", "Modified", "Path"]),
        |table, unit| {
            table.row(vec![
                unit.name.clone(),
                format_timestamp(&unit.modified),
                unit.path.display().to_string(),
            ])
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unit_table_rows_follow_discovery_order() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test_a.c"), "").unwrap();
        fs::write(temp_dir.path().join("helper.c"), "").unwrap();
        let mut config = TgConfig::default();
        config.discovery.root = temp_dir.path().to_path_buf();

        let units = TestDiscovery::new(config.discovery.clone()).discover().unwrap().units;
        let rendered = unit_table(&units).render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("test_a "));
        assert!(!rendered.contains("helper"));
    }

    #[test]
    fn test_list_rejects_invalid_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = TgConfig::default();
        config.discovery.root = temp_dir.path().to_path_buf();
        assert!(list_command(&config, Some("a\0b")).is_err());
        assert!(list_command(&config, Some("a")).unwrap());
    }

    #[test]
    fn test_list_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = TgConfig::default();
        config.discovery.root = temp_dir.path().join("missing");
        assert!(list_command(&config, None).is_err());
    }
}
