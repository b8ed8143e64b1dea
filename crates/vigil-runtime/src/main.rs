// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `vigil`: the hardware optimization daemon.

mod commands;
mod platform;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::{parse_command, Command, HELP};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use platform::{apply_user_change, Platform};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vigil_control::{Orchestrator, ReoptimizeReason};
use vigil_core::context::{PowerSource, UserIntent};
use vigil_core::VigilConfig;
use vigil_infra::{JsonFileBackend, SimulatedDevice};

/// How often the main loop wakes up.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Multi-agent power, thermal and display optimizer for Legion laptops.
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RON configuration file. Defaults apply when absent.
    config: Option<PathBuf>,

    /// Run against a simulated laptop instead of sysfs.
    #[arg(long)]
    simulate: bool,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Directory for learned preferences and statistics.
    #[arg(long, default_value = "/var/lib/vigil")]
    state_dir: PathBuf,

    /// What the user wants from the machine.
    #[arg(long, value_enum, default_value_t = Intent::Balanced)]
    intent: Intent,

    /// Print diagnostics every this many seconds (0 disables).
    #[arg(long, default_value_t = 30)]
    status_every: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Intent {
    Balanced,
    Gaming,
    MaxPerformance,
    Productivity,
    BatterySaving,
    Quiet,
}

impl From<Intent> for UserIntent {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::Balanced => UserIntent::Balanced,
            Intent::Gaming => UserIntent::Gaming,
            Intent::MaxPerformance => UserIntent::MaxPerformance,
            Intent::Productivity => UserIntent::Productivity,
            Intent::BatterySaving => UserIntent::BatterySaving,
            Intent::Quiet => UserIntent::Quiet,
        }
    }
}

/// Forwards stdin lines. The channel disconnects at end of input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("vigil-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        log::warn!("Runtime: no interactive commands, stdin reader failed: {}", err);
    }
    rx
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => VigilConfig::load_or_default(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => VigilConfig::default(),
    };

    let platform = if args.simulate {
        log::info!("Runtime: running against a simulated laptop.");
        Platform::Simulated(SimulatedDevice::new())
    } else {
        Platform::sysfs()?
    };
    let persistence = Arc::new(JsonFileBackend::new(&args.state_dir));
    log::info!("Runtime: state directory {}", args.state_dir.display());

    let (collaborators, handlers) = platform.wire(args.intent.into(), persistence)?;
    let mut orchestrator = Orchestrator::new(config, collaborators)?;
    orchestrator.start()?;

    let commands = spawn_stdin_reader();
    let mut stdin_open = true;
    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let status_every = (args.status_every > 0).then(|| Duration::from_secs(args.status_every));
    let mut next_status = status_every.map(|every| started + every);
    let mut on_mains = platform.on_mains();
    let mut last_poll = Instant::now();

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("Runtime: duration elapsed.");
            break;
        }

        let line = if stdin_open {
            match commands.recv_timeout(POLL_INTERVAL) {
                Ok(line) => Some(line),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    stdin_open = false;
                    None
                }
            }
        } else {
            thread::sleep(POLL_INTERVAL);
            None
        };

        if let Some(line) = line.filter(|l| !l.trim().is_empty()) {
            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(err) = handle(command, &orchestrator, &platform, &handlers) {
                        eprintln!("error: {err:#}");
                    }
                }
                Err(message) => eprintln!("{message}"),
            }
        }

        let now = Instant::now();
        platform.advance(now - last_poll);
        last_poll = now;

        let mains = platform.on_mains();
        if mains != on_mains {
            log::info!("Runtime: power source changed.");
            orchestrator.request_reoptimization(ReoptimizeReason::PowerSourceChanged);
            on_mains = mains;
        }

        if let (Some(due), Some(every)) = (next_status, status_every) {
            if now >= due {
                println!("{}", orchestrator.diagnostics());
                next_status = Some(due + every);
            }
        }
    }

    orchestrator.stop()?;
    println!("{}", orchestrator.diagnostics());
    Ok(())
}

fn handle(
    command: Command,
    orchestrator: &Orchestrator,
    platform: &Platform,
    handlers: &vigil_core::HandlerRegistry,
) -> Result<()> {
    let simulated = || {
        platform
            .simulated()
            .context("only available with --simulate")
    };
    match command {
        Command::Quit => {}
        Command::Help => println!("{HELP}"),
        Command::Status => println!("{}", orchestrator.diagnostics()),
        Command::Tick => match orchestrator.tick_now() {
            Some(report) => println!(
                "tick {}: {} proposals, {} applied, {} conflicts, {} adjusted",
                report.tick,
                report.proposals,
                report.execution.applied_count(),
                report.conflicts_resolved,
                report.adjusted
            ),
            None => println!("tick did not complete"),
        },
        Command::Persist => orchestrator.persist_now()?,
        Command::Set { target, value } => {
            let previous = apply_user_change(handlers, &target, &value)?;
            let record = orchestrator.report_user_change(&target, value);
            println!(
                "{} {} → {} recorded for {}",
                record.target, previous, record.user_value, record.signature
            );
        }
        Command::Plug => simulated()?.set_power_source(PowerSource::Ac),
        Command::Unplug => simulated()?.set_power_source(PowerSource::Battery),
        Command::Battery(percent) => simulated()?.set_battery_percent(percent.clamp(0.0, 100.0)),
        Command::Temps(cpu, gpu) => {
            simulated()?.set_temperatures(cpu, gpu);
            orchestrator.tick_now();
        }
    }
    Ok(())
}
