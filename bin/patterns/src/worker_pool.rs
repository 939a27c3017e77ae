use foundation_patterns::scenarios::worker_pool;
use foundation_patterns::DemoSettings;

use crate::BoxedError;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("worker-pool")
            .about("a fixed number of workers squaring a backlog of task ids")
            .arg(
                clap::Arg::new("tasks")
                    .long("tasks")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                clap::Arg::new("workers")
                    .long("workers")
                    .action(clap::ArgAction::Set)
                    .value_parser(clap::value_parser!(usize)),
            ),
    )
}

pub fn run(args: &clap::ArgMatches, settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let (mut config, mut tasks) = settings.worker_pool()?;

    if let Some(count) = args.get_one::<usize>("tasks") {
        tasks = *count;
    }
    if let Some(workers) = args.get_one::<usize>("workers") {
        config = config.max_workers(*workers);
    }

    let results = worker_pool::run(tasks, config)?;
    println!("{results}");
    Ok(())
}
