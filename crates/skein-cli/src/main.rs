mod scenario;

use anyhow::{anyhow, ensure, Result};
use clap::{Args, Parser, Subcommand};
use skein_rt::{RuntimeConfig, MAX_THREADS};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RuntimeArgs {
    /// Preemption timer period in microseconds
    #[arg(long, global = true, default_value_t = 10_000)]
    timer_us: u64,

    /// Disable the preemption timer; threads switch only when they yield or block
    #[arg(long, global = true)]
    cooperative: bool,

    /// Stack size of each spawned thread in KiB
    #[arg(long, global = true, default_value_t = 64)]
    stack_kib: usize,
}

impl RuntimeArgs {
    fn config(&self) -> Result<RuntimeConfig> {
        let interval = if self.cooperative {
            None
        } else {
            ensure!(self.timer_us > 0, "--timer-us must be positive");
            Some(Duration::from_micros(self.timer_us))
        };
        let stack_size = self
            .stack_kib
            .checked_mul(1024)
            .ok_or_else(|| anyhow!("--stack-kib {} is too large", self.stack_kib))?;
        Ok(RuntimeConfig::new()
            .with_stack_size(stack_size)
            .with_timer_interval(interval))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Threads that yield a fixed number of times, then exit
    Yield {
        /// Number of threads to spawn
        #[arg(long, default_value_t = 3)]
        threads: usize,

        /// Yields per thread
        #[arg(long, default_value_t = 10)]
        iterations: usize,
    },
    /// Threads incrementing a shared counter under a mutex
    Counter {
        /// Number of threads to spawn
        #[arg(long, default_value_t = 8)]
        threads: usize,

        /// Locked increments per thread
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
    },
    /// Threads that spin without yielding; only the timer interleaves them
    Spin {
        /// Number of threads to spawn
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// How long each thread spins, in milliseconds
        #[arg(long, default_value_t = 200)]
        millis: u64,
    },
}

impl Commands {
    fn threads(&self) -> usize {
        match self {
            Commands::Yield { threads, .. }
            | Commands::Counter { threads, .. }
            | Commands::Spin { threads, .. } => *threads,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let threads = cli.command.threads();
    ensure!(
        (1..MAX_THREADS).contains(&threads),
        "--threads must be between 1 and {}",
        MAX_THREADS - 1
    );

    let config = cli.runtime.config()?;
    skein_rt::init(config)?;

    let outcome = match cli.command {
        Commands::Yield {
            threads,
            iterations,
        } => scenario::yield_rounds(threads, iterations),
        Commands::Counter {
            threads,
            iterations,
        } => scenario::locked_counter(threads, iterations),
        Commands::Spin { threads, millis } => {
            scenario::spin(threads, Duration::from_millis(millis))
        }
    };

    let stats = skein_rt::stats();
    skein_rt::shutdown();
    outcome?;

    println!(
        "switches: {}, timer ticks: {}, preemptions: {}",
        stats.switches, stats.timer_ticks, stats.preemptions
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(stack_kib: usize, timer_us: u64, cooperative: bool) -> RuntimeArgs {
        RuntimeArgs {
            timer_us,
            cooperative,
            stack_kib,
        }
    }

    #[test]
    fn maps_flags_onto_runtime_config() {
        let config = args(128, 500, false).config().unwrap();
        assert_eq!(config.stack_size, 128 * 1024);
        assert_eq!(config.timer_interval, Some(Duration::from_micros(500)));

        let config = args(64, 0, true).config().unwrap();
        assert_eq!(config.timer_interval, None);
    }

    #[test]
    fn rejects_stack_sizes_that_overflow() {
        assert!(args(usize::MAX, 10_000, false).config().is_err());
        assert!(args(usize::MAX / 1024 + 1, 10_000, true).config().is_err());
    }

    #[test]
    fn rejects_zero_timer_period() {
        assert!(args(64, 0, false).config().is_err());
    }
}
