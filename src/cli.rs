//! Interactive REPL issuing host→guest commands

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::gateway::GatewayHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exec { file: String, params: String },
    Kill { name: String, pid: i32 },
    ListProcesses,
    AffinityByName { name: String, mask: i32 },
    AffinityByPid { pid: i32, mask: i32 },
    Front { name: String },
    Key { vkey: u8, flags: i32 },
    Mouse { flags: i32, dx: i16, dy: i16, wheel: i16 },
    Clipboard { text: String },
    Status,
    Help,
    Quit,
}

/// Decimal or `0x`-prefixed hex
fn parse_int<T>(value: &str) -> Result<T, String>
where
    T: TryFrom<i64>,
{
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => value.parse::<i64>(),
    }
    .map_err(|_| format!("not a number: {}", value))?;
    T::try_from(parsed).map_err(|_| format!("out of range: {}", value))
}

fn arg<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("usage: {}", usage))
}

pub fn parse_command(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let args: Vec<&str> = rest.split_whitespace().collect();

    match verb {
        "exec" => {
            let file = arg(&args, 0, "exec <file> [params...]")?.to_string();
            let params = args[1..].join(" ");
            Ok(ReplCommand::Exec { file, params })
        }
        "kill" => {
            let name = arg(&args, 0, "kill <name> [pid]")?.to_string();
            let pid = args.get(1).map(|pid| parse_int(pid)).transpose()?.unwrap_or(0);
            Ok(ReplCommand::Kill { name, pid })
        }
        "ps" => Ok(ReplCommand::ListProcesses),
        "affinity" => {
            let usage = "affinity <name|pid> <mask>";
            let target = arg(&args, 0, usage)?;
            let mask = parse_int(arg(&args, 1, usage)?)?;
            match target.parse::<i32>() {
                Ok(pid) => Ok(ReplCommand::AffinityByPid { pid, mask }),
                Err(_) => Ok(ReplCommand::AffinityByName {
                    name: target.to_string(),
                    mask,
                }),
            }
        }
        "front" => Ok(ReplCommand::Front {
            name: arg(&args, 0, "front <name>")?.to_string(),
        }),
        "key" => {
            let usage = "key <vk> <flags>";
            Ok(ReplCommand::Key {
                vkey: parse_int(arg(&args, 0, usage)?)?,
                flags: parse_int(arg(&args, 1, usage)?)?,
            })
        }
        "mouse" => {
            let usage = "mouse <flags> <dx> <dy> [wheel]";
            Ok(ReplCommand::Mouse {
                flags: parse_int(arg(&args, 0, usage)?)?,
                dx: parse_int(arg(&args, 1, usage)?)?,
                dy: parse_int(arg(&args, 2, usage)?)?,
                wheel: args.get(3).map(|w| parse_int(w)).transpose()?.unwrap_or(0),
            })
        }
        "clip" => {
            if rest.is_empty() {
                return Err("usage: clip <text>".to_string());
            }
            Ok(ReplCommand::Clipboard {
                text: rest.to_string(),
            })
        }
        "status" => Ok(ReplCommand::Status),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "exit" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown command: {}", other)),
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    for (usage, about) in [
        ("exec <file> [params...]", "start a program in the guest"),
        ("kill <name> [pid]", "terminate a guest process"),
        ("ps", "list guest processes"),
        ("affinity <name|pid> <mask>", "set CPU affinity"),
        ("front <name>", "bring a window to the front"),
        ("key <vk> <flags>", "send a virtual key"),
        ("mouse <flags> <dx> <dy> [wheel]", "send pointer input"),
        ("clip <text>", "set the guest clipboard"),
        ("status", "show gateway state"),
        ("quit", "stop the gateway"),
    ] {
        println!("  {:<34} {}", usage.cyan(), about);
    }
}

fn dispatch(handle: &GatewayHandle, command: ReplCommand) {
    match command {
        ReplCommand::Exec { file, params } => handle.exec(&file, &params),
        ReplCommand::Kill { name, pid } => handle.kill_process(Some(&name), pid),
        ReplCommand::ListProcesses => handle.list_processes(),
        ReplCommand::AffinityByName { name, mask } => {
            handle.set_process_affinity_by_name(&name, mask)
        }
        ReplCommand::AffinityByPid { pid, mask } => handle.set_process_affinity_by_pid(pid, mask),
        ReplCommand::Front { name } => handle.bring_to_front(&name, 0),
        ReplCommand::Key { vkey, flags } => handle.keyboard_event(vkey, flags),
        ReplCommand::Mouse {
            flags,
            dx,
            dy,
            wheel,
        } => handle.mouse_event(flags, dx, dy, wheel),
        ReplCommand::Clipboard { text } => handle.set_clipboard_data(&text),
        ReplCommand::Status => {
            let state = if handle.is_initialized() {
                "initialized".green()
            } else {
                "waiting for INIT".yellow()
            };
            let pointer = handle.pointer();
            println!("  guest {} ({})", handle.client_addr(), state);
            println!("  pointer {},{} (#{})", pointer.x, pointer.y, pointer.generation);
            return;
        }
        ReplCommand::Help | ReplCommand::Quit => return,
    }
    if !handle.is_initialized() {
        println!("{}", "  queued until the guest sends INIT".yellow());
    }
}

/// Run the REPL on a blocking thread; returns when the user quits
pub async fn run_repl(handle: GatewayHandle) -> Result<()> {
    tokio::task::spawn_blocking(move || repl_loop(&handle)).await?
}

fn repl_loop(handle: &GatewayHandle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", "Type 'help' for commands.".dimmed());

    loop {
        let line = match rl.readline("winhandler> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        match parse_command(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Help) => print_help(),
            Ok(command) => dispatch(handle, command),
            Err(e) => println!("{}", e.red()),
        }
    }

    Ok(())
}
