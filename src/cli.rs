//! Command-line interface and REPL
//!
//! The line editor blocks, so it runs on its own thread and hands lines to
//! the async main loop over a channel. Parsing and rendering live here so the
//! main loop only dispatches.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::feedback::FeedbackOutput;
use crate::protocol::Direction;
use crate::session::Action;
use crate::state::{ConnectionState, ControlId, SessionSnapshot, StateEvent};

const PROMPT: &str = "symetrix> ";

/// Parsed REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Action(Action),
    /// All controls, or one
    Show(Option<ControlId>),
    Json,
    Feedbacks,
    Help,
    Quit,
}

/// Read lines on a dedicated thread; the channel closes on EOF or Ctrl-C
pub fn spawn_repl() -> Result<mpsc::UnboundedReceiver<String>> {
    let mut rl = DefaultEditor::new().context("Failed to initialise line editor")?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || loop {
            match rl.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                },
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    warn!("REPL read failed: {}", e);
                    break;
                },
            }
        })
        .context("Failed to spawn REPL thread")?;

    Ok(rx)
}

fn arg<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| anyhow!("missing <{}>", name))
}

fn number<T: std::str::FromStr>(args: &[&str], index: usize, name: &str) -> Result<T> {
    let text = arg(args, index, name)?;
    text.parse()
        .map_err(|_| anyhow!("invalid <{}>: {}", name, text))
}

fn control(args: &[&str], index: usize) -> Result<ControlId> {
    let n: u32 = number(args, index, "control")?;
    ControlId::new(n).ok_or_else(|| {
        anyhow!("control number must be 1-{}, got {}", ControlId::MAX_PROTOCOL, n)
    })
}

/// LED flashes for a bare `flash`
pub const DEFAULT_FLASH_COUNT: u8 = 4;

/// Parse one REPL line, `None` for blank input
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "flash" => ReplCommand::Action(Action::FlashUnit {
            count: if args.is_empty() { DEFAULT_FLASH_COUNT } else { number(args, 0, "count")? },
        }),
        "reboot" => ReplCommand::Action(Action::Reboot),
        "preset" => ReplCommand::Action(Action::LoadPreset {
            preset: number(args, 0, "preset")?,
        }),
        "global" => ReplCommand::Action(Action::LoadGlobalPreset {
            preset: number(args, 0, "preset")?,
        }),
        "latest" => ReplCommand::Action(Action::GetLatestPreset),
        "set" => ReplCommand::Action(Action::SetValue {
            control: control(args, 0)?,
            value: number(args, 1, "value")?,
        }),
        verb @ ("inc" | "dec") => ReplCommand::Action(Action::ChangeValue {
            control: control(args, 0)?,
            direction: if verb == "inc" {
                Direction::Increase
            } else {
                Direction::Decrease
            },
            delta: number(args, 1, "delta")?,
        }),
        "toggle" => ReplCommand::Action(Action::ToggleOnOff {
            control: control(args, 0)?,
            on_value: if args.len() > 1 {
                number(args, 1, "on value")?
            } else {
                u16::MAX
            },
        }),
        "reconnect" => ReplCommand::Action(Action::Reconnect),
        "show" => ReplCommand::Show(if args.is_empty() { None } else { Some(control(args, 0)?) }),
        "json" => ReplCommand::Json,
        "feedbacks" | "fb" => ReplCommand::Feedbacks,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => bail!("unknown command '{}', type 'help'", other),
    };

    debug!(?command, "REPL command parsed");
    Ok(Some(command))
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold());
    let rows = [
        ("flash [n]", "flash the unit's LEDs n times (1-20, default 4)"),
        ("reboot", "reboot the DSP"),
        ("preset <n>", "load preset n (1-1000)"),
        ("global <n>", "load global preset n (1-1000)"),
        ("latest", "ask for the last recalled preset"),
        ("set <c> <v>", "set control c to raw value v (0-65535)"),
        ("inc|dec <c> <d>", "change control c by d"),
        ("toggle <c> [on]", "toggle control c between 0 and on (default 65535)"),
        ("reconnect", "drop the connection and connect again"),
        ("show [c]", "list known controls"),
        ("json", "dump the session state as JSON"),
        ("feedbacks", "evaluate configured feedbacks"),
        ("quit", "exit"),
    ];
    for (usage, text) in rows {
        println!("  {:<18} {}", usage.yellow(), text);
    }
    println!();
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn connection_label(state: ConnectionState) -> ColoredString {
    match state {
        ConnectionState::Connected => state.to_string().green(),
        ConnectionState::Connecting => state.to_string().yellow(),
        ConnectionState::Disconnected => state.to_string().red(),
    }
}

pub fn print_event(event: &StateEvent) {
    let ts = timestamp().dimmed();
    match event {
        StateEvent::ConnectionChanged { state, message } => match message {
            Some(message) => println!("{} {} ({})", ts, connection_label(*state), message),
            None => println!("{} {}", ts, connection_label(*state)),
        },
        StateEvent::ControlRegistered { variable, .. } => {
            println!("{} {} {}", ts, "+".green(), variable.label.cyan());
        },
        StateEvent::ControlChanged(state) => {
            println!(
                "{} {:>5} = {:>5}  {:>5.1}%  {}",
                ts,
                state.control.to_string().cyan(),
                state.raw,
                state.percent,
                state.decibel_text
            );
        },
        StateEvent::LastPresetChanged(preset) => {
            println!("{} {} {}", ts, "preset".magenta(), preset);
        },
        StateEvent::Reset => println!("{} {}", ts, "state cleared".dimmed()),
    }
}

pub fn print_snapshot(snapshot: &SessionSnapshot, only: Option<ControlId>) {
    println!(
        "{} {}  {} {}",
        "connection:".bold(),
        connection_label(snapshot.connection),
        "last preset:".bold(),
        snapshot
            .last_preset
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let controls: Vec<_> = match only {
        Some(control) => snapshot.control(control).into_iter().collect(),
        None => snapshot.controls.values().collect(),
    };
    if controls.is_empty() {
        println!("  {}", "no control values known".dimmed());
        return;
    }
    for state in controls {
        println!(
            "  {:>5}  raw {:>5}  {:>5.1}%  {}",
            state.control.to_string().cyan(),
            state.raw,
            state.percent,
            state.decibel_text
        );
    }
}

pub fn print_feedback(name: &str, output: &FeedbackOutput) {
    let value = match output {
        FeedbackOutput::Active(true) => output.to_string().green(),
        FeedbackOutput::Active(false) => output.to_string().dimmed(),
        FeedbackOutput::Text(_) => output.to_string().normal(),
    };
    println!("{} {} {}", timestamp().dimmed(), format!("[{}]", name).blue(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ControlId {
        ControlId::new(n).unwrap()
    }

    fn parsed(line: &str) -> ReplCommand {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_actions() {
        assert_eq!(parsed("flash"), ReplCommand::Action(Action::FlashUnit { count: 4 }));
        assert_eq!(parsed("flash 5"), ReplCommand::Action(Action::FlashUnit { count: 5 }));
        assert_eq!(parsed("preset 12"), ReplCommand::Action(Action::LoadPreset { preset: 12 }));
        assert_eq!(
            parsed("GLOBAL 3"),
            ReplCommand::Action(Action::LoadGlobalPreset { preset: 3 })
        );
        assert_eq!(
            parsed("set 4 1000"),
            ReplCommand::Action(Action::SetValue { control: id(4), value: 1000 })
        );
        assert_eq!(
            parsed("dec 4 10"),
            ReplCommand::Action(Action::ChangeValue {
                control: id(4),
                direction: Direction::Decrease,
                delta: 10
            })
        );
        assert_eq!(
            parsed("toggle 9"),
            ReplCommand::Action(Action::ToggleOnOff { control: id(9), on_value: 65535 })
        );
        assert_eq!(parsed("reconnect"), ReplCommand::Action(Action::Reconnect));
    }

    #[test]
    fn test_host_commands() {
        assert_eq!(parsed("show"), ReplCommand::Show(None));
        assert_eq!(parsed("show 7"), ReplCommand::Show(Some(id(7))));
        assert_eq!(parsed("json"), ReplCommand::Json);
        assert_eq!(parsed("fb"), ReplCommand::Feedbacks);
        assert_eq!(parsed("exit"), ReplCommand::Quit);
    }

    #[test]
    fn test_errors() {
        assert!(parse_command("preset").is_err());
        assert!(parse_command("set 4 70000").is_err());
        assert!(parse_command("set 0 1").is_err());
        assert!(parse_command("bogus").is_err());
    }

    #[test]
    fn test_range_is_checked_by_session() {
        // Parses fine, the session rejects it when issued
        let ReplCommand::Action(action) = parsed("flash 30") else {
            panic!("expected action");
        };
        assert!(action.validate().is_err());
    }
}
