use std::process::exit;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dirpp::cli::{self, CliArgs, ConfigFile};
use dirpp::{Config, Preprocessor};

const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_ABORTED: i32 = 3;

fn usage_error(message: &str) -> ! {
    eprintln!("dirpp: {message}");
    eprintln!("{}", cli::USAGE);
    exit(EXIT_USAGE);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

/// Load the config file the arguments select, then layer the arguments
/// over it.
fn load_config(args: &CliArgs) -> Config {
    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };

    let mut config = match &path {
        None => Config::default(),
        Some(path) => match Config::load_file(path) {
            Ok((config, errors)) => {
                for e in errors {
                    warn!(target: "dirpp::config", file = %path.display(), "{e}");
                }
                config
            }
            Err(e) => {
                eprintln!("dirpp: cannot read config {}: {e}", path.display());
                exit(EXIT_ERROR);
            }
        },
    };
    if let Some(path) = &path {
        info!(target: "dirpp::config", file = %path.display(), "loaded config");
    }

    if let Err(e) = args.apply(&mut config) {
        usage_error(&e);
    }
    config
}

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => usage_error(&e),
    };

    if args.help {
        println!("{}", cli::USAGE);
        return;
    }

    init_logging(args.verbose);

    if args.list_directives {
        let pp = Preprocessor::new(Config::default());
        print!("{}", pp.registry().reference());
        return;
    }

    let config = load_config(&args);
    if config.sources.is_empty() {
        usage_error("no source directory given");
    }

    let pp = Preprocessor::new(config);
    let report = match pp.run_config() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("dirpp: {}", e.report());
            exit(EXIT_ERROR);
        }
    };

    info!(
        target: "dirpp",
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        copied = report.copied.len(),
        excluded = report.excluded.len(),
        failed = report.errors.len(),
        dry_run = pp.config().dry_run,
        "done"
    );
    if !report.is_success() {
        exit(EXIT_ERROR);
    }
    if report.aborted {
        eprintln!("dirpp: run aborted");
        exit(EXIT_ABORTED);
    }
}
