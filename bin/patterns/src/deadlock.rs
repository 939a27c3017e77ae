use foundation_patterns::scenarios::OrderedLockDemo;
use foundation_patterns::DemoSettings;

use crate::{seconds, seconds_arg, BoxedError};

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("deadlock")
            .about("two locks taken in one global order, which never deadlocks")
            .arg(
                clap::Arg::new("opposed")
                    .long("opposed")
                    .action(clap::ArgAction::SetTrue)
                    .help("Also run two tasks taking the locks in opposite orders"),
            )
            .arg(
                seconds_arg("patience")
                    .help("Seconds the opposed run waits before reporting a deadlock"),
            ),
    )
}

pub fn run(args: &clap::ArgMatches, settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let (config, mut patience) = settings.ordered_locks()?;
    if let Some(value) = seconds(args, "patience")? {
        patience = value;
    }

    let report = OrderedLockDemo::new(config).run_safe()?;
    println!("{report}");

    if args.get_flag("opposed") {
        let report = OrderedLockDemo::new(config).run_opposed(patience)?;
        println!("{report}");
    }
    Ok(())
}
