use foundation_patterns::scenarios::producer_consumer;
use foundation_patterns::DemoSettings;

use crate::{seconds, seconds_arg, BoxedError};

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("producer-consumer")
            .about("producers and consumers sharing one bounded buffer")
            .arg(seconds_arg("duration").help("How long the simulation runs, in seconds"))
            .arg(
                clap::Arg::new("capacity")
                    .long("capacity")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("producers")
                    .long("producers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("consumers")
                    .long("consumers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(args: &clap::ArgMatches, settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let mut config = settings.producer_consumer()?;

    if let Some(duration) = seconds(args, "duration")? {
        config = config.duration(duration);
    }
    if let Some(capacity) = args.get_one::<usize>("capacity") {
        config = config.capacity(*capacity);
    }
    if let Some(producers) = args.get_one::<usize>("producers") {
        config = config.producers(*producers);
    }
    if let Some(consumers) = args.get_one::<usize>("consumers") {
        config = config.consumers(*consumers);
    }

    let report = producer_consumer::run(config)?;
    println!("{report}");
    Ok(())
}
