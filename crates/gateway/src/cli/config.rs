use cb_domain::config::{Config, ConfigSeverity};

/// Run the config linter and print every finding.
///
/// Returns `true` when the config is usable — warnings alone do not
/// fail the check, errors do.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("{config_path}: no issues found");
        return true;
    }

    let mut errors = 0usize;
    for issue in &issues {
        if issue.severity == ConfigSeverity::Error {
            errors += 1;
        }
        println!("{issue}");
    }

    println!(
        "\n{errors} error(s), {} warning(s) in {config_path}",
        issues.len() - errors,
    );

    errors == 0
}

/// Print the fully-resolved config as TOML, defaults included.
///
/// Useful for turning an empty or partial file into a complete one to
/// edit from.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => {
            eprintln!("Could not render config as TOML: {e}");
            std::process::exit(1);
        }
    }
}
