use clap::{Arg, ArgMatches, Command};
use server_promise::error::ServerPromiseError;
use server_promise::{Cache, Config};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn snapshot_arg() -> Arg {
    Arg::new("file")
        .value_name("FILE")
        .help("Snapshot file; defaults to $SERVER_PROMISE_SNAPSHOT")
        .value_parser(clap::value_parser!(PathBuf))
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let matches = Command::new("server-promise")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect serialized server promise caches")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("inspect")
                .about("List every entry of a snapshot in order")
                .arg(snapshot_arg()),
        )
        .subcommand(
            Command::new("get")
                .about("Print the value stored under a key")
                .arg(Arg::new("key").value_name("KEY").required(true))
                .arg(snapshot_arg()),
        )
        .subcommand(
            Command::new("check").about("Validate that a snapshot parses").arg(snapshot_arg()),
        )
        .subcommand(
            Command::new("config").about("Print the configuration read from the environment"),
        )
        .get_matches();

    init_logging(&matches)?;

    let config = Config::from_env()?;
    let mut out = std::io::stdout().lock();

    let result = match matches.subcommand() {
        Some(("inspect", sub)) => load(sub, &config).and_then(|cache| inspect(&cache, &mut out)),
        Some(("get", sub)) => {
            let key = sub.get_one::<String>("key").map(String::as_str).unwrap_or_default();
            load(sub, &config).and_then(|cache| get(&cache, key, &mut out))
        }
        Some(("check", sub)) => load(sub, &config).and_then(|cache| check(&cache, &mut out)),
        Some(("config", _)) => show_config(&config, &mut out),
        _ => Ok(()),
    };

    result.map_err(|e| {
        error!("{}", e);
        e.into()
    })
}

fn init_logging(matches: &ArgMatches) -> Result<(), ServerPromiseError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("server_promise={default_level}")))
        .map_err(|e| ServerPromiseError::Io(format!("Failed to create log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

fn load(matches: &ArgMatches, config: &Config) -> Result<Cache, ServerPromiseError> {
    let config = match matches.get_one::<PathBuf>("file") {
        Some(path) => Config { snapshot_path: Some(path.clone()), ..config.clone() },
        None if config.snapshot_path.is_some() => config.clone(),
        None => return Err(ServerPromiseError::NoSnapshot),
    };

    debug!("loading snapshot from {:?}", config.snapshot_path);
    config.load_snapshot()
}

fn inspect(cache: &Cache, out: &mut impl Write) -> Result<(), ServerPromiseError> {
    for (key, value) in cache.entries() {
        writeln!(out, "{key}\t{value}")?;
    }
    writeln!(out, "{} entries", cache.len())?;
    Ok(())
}

fn get(cache: &Cache, key: &str, out: &mut impl Write) -> Result<(), ServerPromiseError> {
    let value = cache.get(key).ok_or_else(|| ServerPromiseError::MissingEntry(key.to_string()))?;
    writeln!(out, "{value}")?;
    Ok(())
}

fn check(cache: &Cache, out: &mut impl Write) -> Result<(), ServerPromiseError> {
    writeln!(out, "ok: {} entries", cache.len())?;
    Ok(())
}

fn show_config(config: &Config, out: &mut impl Write) -> Result<(), ServerPromiseError> {
    writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
    Ok(())
}
