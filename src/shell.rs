use std::future::Future;
use std::io;

use chrono::{Local, NaiveDate};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::catalog::{self, next_bookable_date};
use crate::engine::{Engine, SlotState, SlotView, ToggleOutcome};
use crate::model::Instrument;

/// Which of the two bookable days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Day {
    Today,
    Next,
}

impl Day {
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            Day::Today => today,
            Day::Next => next_bookable_date(today),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Instruments,
    Show { instrument: String, day: Day },
    Toggle { instrument: String, day: Day, slot: String },
    Pending,
    Refresh,
    Quit,
}

fn parse_day(token: Option<&str>) -> Result<Day, String> {
    match token {
        None | Some("today") => Ok(Day::Today),
        Some("next") | Some("tomorrow") => Ok(Day::Next),
        Some(other) => Err(format!("unknown day '{other}', expected 'today' or 'next'")),
    }
}

pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let cmd = match verb {
        "help" | "?" => ShellCommand::Help,
        "instruments" | "ls" => ShellCommand::Instruments,
        "show" => {
            let instrument = words.next().ok_or("usage: show <instrument> [today|next]")?;
            ShellCommand::Show {
                instrument: instrument.to_string(),
                day: parse_day(words.next())?,
            }
        }
        "toggle" | "t" => {
            let usage = "usage: toggle <instrument> <today|next> <HH:MM>";
            let instrument = words.next().ok_or(usage)?;
            let day = parse_day(Some(words.next().ok_or(usage)?))?;
            let slot = words.collect::<Vec<_>>().join(" ");
            if slot.is_empty() {
                return Err(usage.into());
            }
            ShellCommand::Toggle {
                instrument: instrument.to_string(),
                day,
                slot,
            }
        }
        "pending" => ShellCommand::Pending,
        "refresh" => ShellCommand::Refresh,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(cmd))
}

/// Accepts an instrument name or its 1-based position in the catalog.
pub fn resolve_instrument<'a>(instruments: &'a [Instrument], token: &str) -> Option<&'a Instrument> {
    if let Ok(n) = token.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| instruments.get(i));
    }
    instruments.iter().find(|i| i.name.eq_ignore_ascii_case(token))
}

pub fn render_board(board: &[SlotView]) -> String {
    let mut out = String::new();
    for view in board {
        let state = match &view.state {
            SlotState::Free => "free".to_string(),
            SlotState::Reserved { mine: true, .. } => "reserved by you".to_string(),
            SlotState::Reserved { by, .. } => format!("reserved by {by}"),
            SlotState::PendingCreate => "reserving...".to_string(),
            SlotState::PendingDelete => "releasing...".to_string(),
        };
        out.push_str(&format!("  {:<22}{state}\n", view.slot.label));
    }
    out
}

const HELP: &str = "\
commands:
  instruments                          list instruments
  show <instrument> [today|next]       slot board for one instrument
  toggle <instrument> <today|next> <HH:MM>
                                       reserve a free slot or release your own
  pending                              mutations awaiting the server
  refresh                              reload from the server
  quit";

/// Read commands from stdin until EOF, `quit`, or `shutdown` resolves.
pub async fn run(engine: Engine, instruments: Vec<Instrument>, shutdown: impl Future<Output = ()>) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::pin!(shutdown);
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else { break };

        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        let today = Local::now().date_naive();
        match cmd {
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Instruments => {
                for (n, inst) in instruments.iter().enumerate() {
                    println!(
                        "{:>2}. {:<20} os={:<8} group={:<4} ip={}",
                        n + 1,
                        inst.name,
                        inst.os.as_deref().unwrap_or("-"),
                        inst.group.as_deref().unwrap_or("-"),
                        inst.ip.as_deref().unwrap_or("-"),
                    );
                }
            }
            ShellCommand::Show { instrument, day } => {
                let Some(inst) = resolve_instrument(&instruments, &instrument) else {
                    println!("no such instrument: {instrument}");
                    continue;
                };
                let date = day.resolve(today);
                match engine.board(&inst.name, date).await {
                    Ok(board) => print!("{} on {date}\n{}", inst.name, render_board(&board)),
                    Err(e) => println!("error: {e}"),
                }
            }
            ShellCommand::Toggle { instrument, day, slot } => {
                let Some(inst) = resolve_instrument(&instruments, &instrument) else {
                    println!("no such instrument: {instrument}");
                    continue;
                };
                let date = day.resolve(today);
                let Some(slot) = catalog::find_slot(date, &slot) else {
                    println!("no slot '{slot}' on {date}");
                    continue;
                };
                let engine = engine.clone();
                let name = inst.name.clone();
                // Runs in the background so further commands are accepted while pending.
                tokio::spawn(async move {
                    match engine.toggle(&name, &slot.label, date).await {
                        Ok(ToggleOutcome::Reserved(_)) => println!("reserved {name} {date} {}", slot.label),
                        Ok(ToggleOutcome::Released) => println!("released {name} {date} {}", slot.label),
                        Ok(ToggleOutcome::AlreadyPending) => {
                            println!("{name} {date} {} is still being updated", slot.label)
                        }
                        Err(e) => println!("could not toggle {name} {date} {}: {e}", slot.label),
                    }
                });
            }
            ShellCommand::Pending => match engine.view().await {
                Ok(view) if view.pending.is_empty() => println!("nothing pending"),
                Ok(view) => {
                    for key in view.pending.iter() {
                        println!("  {key}");
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            ShellCommand::Refresh => match engine.refresh().await {
                Ok(()) => println!("refreshed"),
                Err(e) => println!("refresh failed: {e}"),
            },
            ShellCommand::Quit => break,
        }
    }
    Ok(())
}
