//! featrule CLI — driving adapter for the featrule rule engine.
//!
//! Subcommands:
//! - `validate <rules>` — decode and validate every rule
//! - `dryrun <rules> --features <file> [--exhaustive]` — run the rule set, print merged output
//! - `test <rules> --features <file>` — run each rule with diagnostics, report mismatches
//!
//! `-v` anywhere on the command line raises logging to `debug`; `RUST_LOG`
//! overrides both.

use std::fmt::Write as _;
use std::process;

use featrule::prelude::*;
use featrule::{RuleSetOutput, TracingObserver};
use tracing_subscriber::EnvFilter;

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut args, &["-v", "--verbose"]);
    init_logging(verbose);

    let Some(command) = args.first().cloned() else {
        print_usage();
        process::exit(1);
    };

    let result = match command.as_str() {
        "validate" => parse_options(&args[1..]).and_then(|o| cmd_validate(&o)),
        "dryrun" => parse_options(&args[1..]).and_then(|o| cmd_dryrun(&o)),
        "test" => parse_options(&args[1..]).and_then(|o| cmd_test(&o)),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("error: unknown command \"{other}\"");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_validate(opts: &Options) -> Result<(), String> {
    let rules = load_rules(&opts.rules)?;
    let (report, invalid) = validate_report(&rules);
    print!("{report}");

    if invalid > 0 {
        return Err(format!("{invalid} of {} rules invalid", rules.len()));
    }
    Ok(())
}

fn cmd_dryrun(opts: &Options) -> Result<(), String> {
    let rules = load_rules(&opts.rules)?;
    let features = load_features(opts.features.as_deref())?;

    let out = rules.execute_with(&features, !opts.exhaustive, &TracingObserver);
    for failure in &out.failures {
        eprintln!("rule \"{}\": {}", failure.rule, failure.error);
    }
    print!("{}", render_output(&out)?);

    if !out.is_ok() {
        return Err(format!("{} rules failed", out.failures.len()));
    }
    Ok(())
}

fn cmd_test(opts: &Options) -> Result<(), String> {
    let rules = load_rules(&opts.rules)?;
    let features = load_features(opts.features.as_deref())?;

    let (report, failed) = test_report(&rules, &features);
    print!("{report}");

    if failed > 0 {
        return Err(format!("{failed} of {} rules did not match", rules.len()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════════════

/// One line per rule; returns the report and the number of invalid rules.
fn validate_report(rules: &RuleSet) -> (String, usize) {
    let failures = rules.validate();
    let mut report = String::new();
    for rule in &rules.rules {
        let line = match failures.iter().find(|f| f.rule == rule.name) {
            Some(f) => format!("FAIL  {}: {}", rule.name, f.error),
            None => format!("OK    {}", rule.name),
        };
        report.push_str(&line);
        report.push('\n');
    }
    (report, failures.len())
}

/// Run every rule on its own in exhaustive mode and list failed expressions.
fn test_report(rules: &RuleSet, features: &Features) -> (String, usize) {
    let mut report = String::new();
    let mut failed = 0;

    for rule in &rules.rules {
        match rule.execute_with(features, false, &TracingObserver) {
            Ok(out) if out.is_match() => {
                writeln!(report, "MATCH     {}", rule.name).ok();
            }
            Ok(out) => {
                failed += 1;
                writeln!(report, "NO MATCH  {}", rule.name).ok();
                for expr in out.match_status.expressions().filter(|e| !e.is_match) {
                    let name = expr.name.as_deref().unwrap_or("<name>");
                    writeln!(report, "    {} {name}: {}", expr.feature, expr.expression).ok();
                }
            }
            Err(e) => {
                failed += 1;
                writeln!(report, "ERROR     {}: {e}", rule.name).ok();
            }
        }
    }
    (report, failed)
}

fn render_output(out: &RuleSetOutput) -> Result<String, String> {
    serde_yaml::to_string(out).map_err(|e| format!("YAML encode error: {e}"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_rules(path: &str) -> Result<RuleSet, String> {
    let rules = RuleSet::from_path(path).map_err(|e| format!("\"{path}\": {e}"))?;
    tracing::debug!(path, rules = rules.len(), "loaded rules");
    Ok(rules)
}

fn load_features(path: Option<&str>) -> Result<Features, String> {
    let path = path.ok_or("--features <file> is required")?;
    Features::from_path(path).map_err(|e| format!("\"{path}\": {e}"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    rules: String,
    features: Option<String>,
    exhaustive: bool,
}

/// Remove every occurrence of any of `names`, returning whether one was present.
fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    let before = args.len();
    args.retain(|a| !names.contains(&a.as_str()));
    args.len() != before
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut rules = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--features" | "-f" => {
                let path = iter.next().ok_or("--features requires a file path")?;
                opts.features = Some(path.clone());
            }
            "--exhaustive" => opts.exhaustive = true,
            flag if flag.starts_with('-') => {
                return Err(format!("unexpected argument \"{flag}\""));
            }
            path if rules.is_none() => rules = Some(path.to_owned()),
            extra => return Err(format!("unexpected argument \"{extra}\"")),
        }
    }

    opts.rules = rules.ok_or("a rules file path is required")?;
    Ok(opts)
}

fn print_usage() {
    eprintln!(
        "Usage: featrule [-v] <command> [options]

Commands:
  validate <rules>                                Validate every rule
  dryrun <rules> --features <file> [--exhaustive] Print merged rule set output
  test <rules> --features <file>                  Report which rules match
  help                                            Show this help"
    );
}
