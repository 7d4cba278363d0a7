use colored::Colorize;
use shiftkit::Report;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print the end-of-run summary.
pub fn report(title: &str, report: &Report) {
    header(title);
    kv("Steps", &report.completed.len().to_string());
    kv("Verified", if report.verified { "yes" } else { "no" });
    if report.source_deleted {
        kv("Source stack", "deleted");
    }

    if !report.warnings.is_empty() {
        section("Warnings");
        for warning in &report.warnings {
            warn(warning);
        }
    }

    println!();
    if report.is_clean() {
        success("Done");
    } else {
        success(&format!(
            "Done with {} warning{}",
            report.warnings.len(),
            if report.warnings.len() == 1 { "" } else { "s" }
        ));
    }
}

/// Print a fatal error: summary and advice, plus the captured command output
/// when `verbose`.
pub fn fatal(err: &anyhow::Error, verbose: bool) {
    let Some(err) = err.downcast_ref::<shiftkit::Error>() else {
        error(&format!("{err:#}"));
        return;
    };

    error(&format!("{}: {err}", err.category()));
    eprintln!("  {} {}", "Hint:".cyan(), err.advice());
    match err.detail() {
        Some(detail) if verbose => {
            eprintln!();
            for line in detail.lines() {
                eprintln!("    {}", line.dimmed());
            }
        }
        Some(_) => eprintln!("  {}", "Rerun with --verbose for the command output".dimmed()),
        None => {}
    }
}
