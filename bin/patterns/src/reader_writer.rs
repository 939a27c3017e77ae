use foundation_patterns::scenarios::reader_writer;
use foundation_patterns::DemoSettings;

use crate::{seconds, seconds_arg, BoxedError};

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("reader-writer")
            .about("readers sharing a counter that writers update exclusively")
            .arg(seconds_arg("duration").help("How long the simulation runs, in seconds"))
            .arg(
                clap::Arg::new("readers")
                    .long("readers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("writers")
                    .long("writers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(args: &clap::ArgMatches, settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let mut config = settings.reader_writer()?;

    if let Some(duration) = seconds(args, "duration")? {
        config = config.duration(duration);
    }
    if let Some(readers) = args.get_one::<usize>("readers") {
        config = config.readers(*readers);
    }
    if let Some(writers) = args.get_one::<usize>("writers") {
        config = config.writers(*writers);
    }

    let report = reader_writer::run(config)?;
    println!("{report}");
    Ok(())
}
