use foundation_patterns::contention;
use foundation_patterns::DemoSettings;

use crate::BoxedError;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("race-check")
            .about("repeats a mutex-protected counter drill and reports desynchronized trials")
            .arg(
                clap::Arg::new("trials")
                    .long("trials")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(args: &clap::ArgMatches, settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let mut config = settings.race_check();
    if let Some(trials) = args.get_one::<usize>("trials") {
        config = config.trials(*trials);
    }

    let report = contention::race_check(config);
    println!("{report}");

    let mut values = vec![10, 2, 3, 8, 5, 2, 0, -1, 8, 3, 4, 5, 6, 2, 3, 4, 0];
    let plan = contention::parallel_add(&mut values, 8);
    println!(
        "Parallel add over {} threads (chunk {}, remainder {}): {:?}",
        plan.threads, plan.chunk, plan.remainder, values
    );
    Ok(())
}
