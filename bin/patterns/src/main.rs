mod all;
mod deadlock;
mod producer_consumer;
mod race_check;
mod reader_writer;
mod worker_pool;

use core::time::Duration;

use foundation_patterns::{signals, DemoSettings};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn main() -> std::result::Result<(), BoxedError> {
    let commander = all::register(race_check::register(deadlock::register(
        reader_writer::register(worker_pool::register(producer_consumer::register(
            clap::Command::new("patterns")
                .about("Runs classic thread-synchronization demos")
                .arg_required_else_help(true)
                .arg(
                    clap::Arg::new("config")
                        .long("config")
                        .global(true)
                        .action(clap::ArgAction::Set)
                        .value_parser(clap::value_parser!(String))
                        .help("TOML settings file overriding the demo defaults"),
                )
                .arg(
                    clap::Arg::new("verbose")
                        .long("verbose")
                        .short('v')
                        .global(true)
                        .action(clap::ArgAction::SetTrue)
                        .help("Log at debug level"),
                ),
        ))),
    )));

    let matches = commander.get_matches();

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = match matches.get_one::<String>("config") {
        Some(path) => DemoSettings::from_path(path)?,
        None => DemoSettings::default(),
    };

    signals::install_interrupt_handler()?;

    match matches.subcommand() {
        Some(("producer-consumer", arguments)) => producer_consumer::run(arguments, &settings)?,
        Some(("worker-pool", arguments)) => worker_pool::run(arguments, &settings)?,
        Some(("reader-writer", arguments)) => reader_writer::run(arguments, &settings)?,
        Some(("deadlock", arguments)) => deadlock::run(arguments, &settings)?,
        Some(("race-check", arguments)) => race_check::run(arguments, &settings)?,
        Some(("all", _)) => all::run(&settings)?,
        _ => {}
    }

    Ok(())
}

/// Reads an optional `--<name> <seconds>` argument.
pub(crate) fn seconds(
    arguments: &clap::ArgMatches,
    name: &str,
) -> std::result::Result<Option<Duration>, BoxedError> {
    match arguments.get_one::<f64>(name) {
        Some(value) => Ok(Some(Duration::try_from_secs_f64(*value)?)),
        None => Ok(None),
    }
}

pub(crate) fn seconds_arg(name: &'static str) -> clap::Arg {
    clap::Arg::new(name)
        .long(name)
        .action(clap::ArgAction::Set)
        .value_parser(clap::value_parser!(f64))
}
