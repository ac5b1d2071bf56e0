//! Command-line interface for sieve
//! Preprocesses one or more entry files in a single session and writes the results to stdout
//! or to an output directory, optionally with source maps.
//!
//! Usage:
//!   sieve `<input>`... [-D name[=value]]... [-l label]... [-m off|inline|external] [-o `<dir>`]

use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use sieve::{CompileRequest, FlagEnv, FsLoader, MapMode, Session, SessionOptions, Value};
use sieve_config::{Loader, SieveConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "sieve.toml";

#[tokio::main]
async fn main() {
    let matches = Command::new("sieve")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Conditional-compilation preprocessor for text files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("inputs")
                .help("Entry files, compiled in order within one session")
                .required(true)
                .num_args(1..)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("out-dir")
                .long("out-dir")
                .short('o')
                .help("Write each output to <dir>/<file name> instead of stdout")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("define")
                .long("define")
                .short('D')
                .help("Set a flag: NAME=VALUE, or NAME alone for true")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("label")
                .long("label")
                .short('l')
                .help("Select a label (repeatable; none selects everything)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("source-map")
                .long("source-map")
                .short('m')
                .help("Source map mode")
                .value_parser(["off", "inline", "external"]),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .help("Directive marker (default: //#)"),
        )
        .arg(
            Arg::new("line-ending")
                .long("line-ending")
                .help("Line terminator of the output")
                .value_parser(["lf", "crlf"]),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file layered over the defaults (default: ./sieve.toml if present)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log more (repeat for trace output)")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    let config = load_config(&matches).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    let out_dir = matches.get_one::<PathBuf>("out-dir");
    let map_mode = config.output.source_map;
    if map_mode == MapMode::External && out_dir.is_none() {
        eprintln!("External source maps need --out-dir");
        std::process::exit(1);
    }

    let flags = config.flags.clone().overlay(&parse_defines(&matches));
    let labels: Vec<String> = config
        .selection
        .labels
        .iter()
        .cloned()
        .chain(
            matches
                .get_many::<String>("label")
                .into_iter()
                .flatten()
                .cloned(),
        )
        .collect();

    let options = SessionOptions::default()
        .with_prefix(config.directives.prefix.clone())
        .with_positions(map_mode != MapMode::Off);
    let mut session = Session::with_options(FsLoader, options);

    let inputs = matches
        .get_many::<PathBuf>("inputs")
        .into_iter()
        .flatten();
    for input in inputs {
        let mut request = CompileRequest::path(input)
            .with_flags(flags.clone())
            .with_labels(labels.iter().cloned())
            .with_line_terminator(config.output.line_ending.as_str())
            .with_map_mode(map_mode);
        let output = out_dir.map(|dir| dir.join(input.file_name().unwrap_or(input.as_os_str())));
        if let Some(output) = &output {
            request = request.with_output(output);
        }

        let result = session.compile(request).await.unwrap_or_else(|e| {
            eprintln!("{}", e);
            std::process::exit(1);
        });
        let text = result.text_with_declaration(config.output.line_ending.as_str());

        match output {
            None => print!("{}", text),
            Some(output) => {
                write_file(&output, &text).await;
                if let (Some(map), Some(url)) = (&result.map, &result.map_url) {
                    let map_path = output.parent().unwrap_or(Path::new("")).join(url);
                    write_file(&map_path, &map.to_json()).await;
                }
            }
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("SIEVE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the config file (or `sieve.toml` when present), then command-line settings
fn load_config(matches: &ArgMatches) -> Result<SieveConfig, sieve_config::ConfigError> {
    let mut loader = Loader::new();
    loader = match matches.get_one::<PathBuf>("config") {
        Some(path) => loader.with_file(path),
        None => loader.with_optional_file(DEFAULT_CONFIG),
    };
    if let Some(prefix) = matches.get_one::<String>("prefix") {
        loader = loader.set_override("directives.prefix", prefix.as_str())?;
    }
    if let Some(mode) = matches.get_one::<String>("source-map") {
        loader = loader.set_override("output.source_map", mode.as_str())?;
    }
    if let Some(ending) = matches.get_one::<String>("line-ending") {
        loader = loader.set_override("output.line_ending", ending.as_str())?;
    }
    loader.build()
}

/// `-D name=value` pairs; a bare name is `true`
fn parse_defines(matches: &ArgMatches) -> FlagEnv {
    matches
        .get_many::<String>("define")
        .into_iter()
        .flatten()
        .map(|define| match define.split_once('=') {
            Some((name, value)) => (name.trim().to_string(), Value::coerce(value)),
            None => (define.trim().to_string(), Value::Bool(true)),
        })
        .collect()
}

async fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            eprintln!("Cannot create {}: {}", parent.display(), e);
            std::process::exit(1);
        }
    }
    debug!(path = %path.display(), "writing");
    if let Err(e) = tokio::fs::write(path, contents).await {
        eprintln!("Cannot write {}: {}", path.display(), e);
        std::process::exit(1);
    }
}
