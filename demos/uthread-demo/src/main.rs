mod cli;
mod error;

use std::cell::{Cell, RefCell};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info};
use uthread::{Scheduler, SchedulerConfig};

use crate::cli::Cli;
use crate::error::DemoError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("uthread", level)
        .filter_module("uthread_demo", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match run_workers(&cli).and_then(|()| run_scenario()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

/// Run `--threads` workers that each yield `--yields` times.
fn run_workers(cli: &Cli) -> Result<(), DemoError> {
    let finished = Cell::new(0usize);
    let sched = Scheduler::new(cli.scheduler_config())?;

    for worker in 0..cli.threads {
        let finished = &finished;
        let yields = cli.yields;
        let id = sched.create(move |s| {
            for turn in 0..=yields {
                println!("worker {}: turn {}/{}", worker, turn, yields);
                if turn < yields {
                    s.yield_now();
                }
            }
            finished.set(finished.get() + 1);
        })?;
        debug!("worker {} runs as {}", worker, id);
    }

    sched.run();

    println!(
        "{} workers finished after {} dispatches",
        finished.get(),
        sched.dispatch_count()
    );

    if finished.get() != cli.threads {
        return Err(DemoError::Incomplete {
            threads: cli.threads,
            finished: finished.get(),
        });
    }
    Ok(())
}

/// Dispatches the fixed scenario needs: A twice, B once, C three times.
const SCENARIO_DISPATCHES: u64 = 6;

/// A yields once, B exits immediately, C yields twice.
fn run_scenario() -> Result<(), DemoError> {
    let trace = RefCell::new(String::new());
    let sched = Scheduler::new(SchedulerConfig::default())?;
    let t = &trace;

    sched.create(move |s| {
        t.borrow_mut().push('A');
        s.yield_now();
        t.borrow_mut().push('A');
        s.exit();
    })?;
    sched.create(move |s| {
        t.borrow_mut().push('B');
        s.exit();
    })?;
    sched.create(move |s| {
        for _ in 0..2 {
            t.borrow_mut().push('C');
            s.yield_now();
        }
        t.borrow_mut().push('C');
        s.exit();
    })?;

    sched.run();

    info!("scenario dispatch order: {}", trace.borrow());
    println!(
        "scenario: order {} with {} dispatches",
        trace.borrow(),
        sched.dispatch_count()
    );

    if sched.dispatch_count() != SCENARIO_DISPATCHES {
        return Err(DemoError::DispatchMismatch {
            expected: SCENARIO_DISPATCHES,
            actual: sched.dispatch_count(),
        });
    }
    Ok(())
}
