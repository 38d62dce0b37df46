// src/main.rs
mod config;
mod drivers;
mod engine;
mod feedback;
mod recorder;
#[cfg(test)]
mod testlog;
mod types;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{debug, error, info, warn};

use crate::config::{ConfigError, FeedbackConfig};
use crate::engine::{wait_for_controller, SessionLoop, WAIT_POLL};
use crate::feedback::AudioOutput;
use crate::recorder::TraceRecorder;
use crate::types::*;

const USAGE: &str = "usage: alphatheta-feedback <config.json> [--autostart]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    config_path: PathBuf,
    autostart: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut config_path = None;
    let mut autostart = false;
    for arg in args {
        match arg.as_str() {
            "--autostart" => autostart = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option '{flag}'")),
            _ if config_path.is_some() => return Err(format!("unexpected argument '{arg}'")),
            _ => config_path = Some(PathBuf::from(arg)),
        }
    }
    let config_path = config_path.ok_or_else(|| "missing config file".to_string())?;
    Ok(CliArgs {
        config_path,
        autostart,
    })
}

// 控制台命令 -> 三态信号
fn parse_command(line: &str) -> Option<SessionState> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" | "run" => Some(SessionState::Run),
        "stop" => Some(SessionState::Stop),
        _ => None,
    }
}

fn spawn_controller(signal: SessionSignal) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(state) => {
                    info!("Controller: {:?}", state);
                    signal.set(state);
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}', expected 'start' or 'stop'", line.trim()),
            }
        }
    });
}

// 会话消息 -> 日志; 引擎自己已经对异常情况打过 warn!
fn report(msg: SessionMessage) {
    match msg {
        SessionMessage::Log(text) => info!("{text}"),
        SessionMessage::State(state) => info!("Session state: {:?}", state),
        SessionMessage::Stale { last_seen } => debug!("No new samples since {:?}", last_seen),
        SessionMessage::Feedback(report) => info!(
            "[{:7.1}s] ratio={:.3} smoothed={:.3} volumes=({:.2}, {:.2})",
            report.elapsed.as_secs_f64(),
            report.ratio,
            report.smoothed,
            report.volumes.0,
            report.volumes.1
        ),
        SessionMessage::Finished(outcome, summary) => info!(
            "Finished: {:?} after {} feedback cycles",
            outcome, summary.applied_cycles
        ),
    }
}

fn spawn_status_printer(rx: Receiver<SessionMessage>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            report(msg);
        }
    })
}

fn run_session(config: &FeedbackConfig, autostart: bool) -> Result<SessionOutcome> {
    let signal = SessionSignal::new(if autostart {
        SessionState::Run
    } else {
        SessionState::Wait
    });
    spawn_controller(signal.clone());
    let (tx, rx) = mpsc::channel();
    let printer = spawn_status_printer(rx);

    if !autostart {
        info!("Type 'start' to begin the session, 'stop' to end it");
    }
    // 先等控制器, 再连设备和声卡
    if wait_for_controller(&signal, WAIT_POLL, Some(&tx)) == SessionState::Stop {
        info!("Stop requested before the session started");
        drop(tx);
        printer.join().ok();
        return Ok(SessionOutcome::Aborted);
    }

    let device = drivers::resolve_device(
        config.device_name.as_deref(),
        config.device_serial.as_deref(),
    );
    info!("Using device '{}' ({:?})", device.name, device.serial);
    let receiver = drivers::connect(&device, config.window_size_sec, config.buffer_size_sec)
        .with_context(|| format!("failed to connect to '{}'", device.name))?;
    let output = AudioOutput::open_default()?;
    let sounds = (
        output.load(&config.sound_state_1_path)?,
        output.load(&config.sound_state_2_path)?,
    );

    let mut session = SessionLoop::new(receiver, config, sounds, signal)?.with_outbox(tx);
    if let Some(path) = &config.trace_path {
        let recorder = TraceRecorder::create(path)
            .with_context(|| format!("failed to create trace file {}", path.display()))?;
        session = session.with_recorder(recorder);
    }
    let outcome = session.run();
    // closes the status channel; the sinks go before the output stream
    drop(session);
    drop(output);
    printer.join().ok();
    Ok(outcome)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    let config = match config::load_config(&args.config_path) {
        Ok(config) => config,
        Err(ConfigError::Invalid(issues)) => {
            for issue in &issues {
                error!("Config: {issue}");
            }
            return ExitCode::from(2);
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    match run_session(&config, args.autostart) {
        Ok(SessionOutcome::Aborted) => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(3)
        }
    }
}
