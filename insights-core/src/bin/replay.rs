//! Offline replay of captured job-posting traffic.
//!
//! Feeds captured response bodies through the interceptor, then walks a list of
//! page URLs through the navigation path and prints the panel each one would
//! produce. Useful for checking id rules and payload shapes after the host site
//! changes, without loading the page.
//!
//! # Usage
//!
//! ```bash
//! insights-replay [--config config.toml] --payload postings.json [--payload more.json] \
//!     --visit "https://www.linkedin.com/jobs/view/3795291370/"
//! ```

use insights_core::host::manual::ManualHost;
use insights_core::{Config, InsightsController};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    payloads: Vec<PathBuf>,
    visits: Vec<String>,
}

#[derive(Serialize)]
struct VisitOutcome<'a> {
    url: &'a str,
    id: Option<String>,
    panel: Option<insights_core::Panel>,
}

fn print_help() {
    eprintln!("insights-replay - replay captured job posting traffic");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    insights-replay [--config PATH] --payload FILE... [--visit URL]...");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH    TOML configuration (user config dir otherwise)");
    eprintln!("    -p, --payload FILE   Captured response body to harvest (repeatable)");
    eprintln!("    -v, --visit URL      Page URL to navigate to (repeatable)");
    eprintln!("    -h, --help           Show this message");
}

/// Parse command line arguments
fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config requires a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--payload" | "-p" => {
                let path = iter.next().ok_or("--payload requires a file")?;
                args.payloads.push(PathBuf::from(path));
            }
            "--visit" | "-v" => {
                let url = iter.next().ok_or("--visit requires a URL")?;
                args.visits.push(url);
            }
            "--help" | "-h" => return Ok(None),
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    if args.payloads.is_empty() {
        return Err("at least one --payload is required".into());
    }

    Ok(Some(args))
}

fn main() {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_help();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            process::exit(2);
        }
    };

    let config = match &args.config {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&args, &config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let host = Rc::new(ManualHost::default());
    let controller = InsightsController::new(Rc::clone(&host), config)?;
    controller.init()?;

    for path in &args.payloads {
        let body = std::fs::read_to_string(path)?;
        match controller.interceptor().harvest_body(&body) {
            Ok(report) => eprintln!(
                "{}: {} entries, {} stored",
                path.display(),
                report.entries,
                report.stored
            ),
            Err(e) => eprintln!("{}: skipped ({})", path.display(), e),
        }
    }

    let settle = config.watcher.navigation_settle();
    let extractor = insights_core::IdExtractor::from_config(&config.extraction)?;

    for url in &args.visits {
        controller.presenter().dismiss();
        host.navigate(url);
        host.advance(settle);

        let outcome = VisitOutcome {
            url,
            id: extractor.extract(url),
            panel: host.visible_panels().into_iter().next(),
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }

    println!("{}", serde_json::to_string(&controller.stats())?);
    controller.destroy();
    Ok(())
}
