use foundation_patterns::contention;
use foundation_patterns::scenarios::{
    producer_consumer, reader_writer, worker_pool, OrderedLockDemo,
};
use foundation_patterns::{signals, DemoSettings};

use crate::BoxedError;

pub fn register(command: clap::Command) -> clap::Command {
    command.subcommand(
        clap::Command::new("all").about("runs every demo in turn, stopping early on Ctrl-C"),
    )
}

pub fn run(settings: &DemoSettings) -> std::result::Result<(), BoxedError> {
    let interrupt = signals::interrupt_signal();

    tracing::info!("=== Producer-Consumer ===");
    println!("{}", producer_consumer::run(settings.producer_consumer()?)?);
    if interrupt.probe() {
        return Ok(());
    }

    tracing::info!("=== Worker Pool ===");
    let (pool, tasks) = settings.worker_pool()?;
    println!("{}", worker_pool::run(tasks, pool)?);
    if interrupt.probe() {
        return Ok(());
    }

    tracing::info!("=== Readers-Writers ===");
    println!("{}", reader_writer::run(settings.reader_writer()?)?);
    if interrupt.probe() {
        return Ok(());
    }

    tracing::info!("=== Lock Ordering ===");
    let (locks, _) = settings.ordered_locks()?;
    println!("{}", OrderedLockDemo::new(locks).run_safe()?);
    if interrupt.probe() {
        return Ok(());
    }

    tracing::info!("=== Race Check ===");
    println!("{}", contention::race_check(settings.race_check()));
    Ok(())
}
