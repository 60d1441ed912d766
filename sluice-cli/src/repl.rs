//! Interactive manage mode: a line-oriented prompt driving the session
//! manager, so several streams can be relayed to local ports at once.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use sluice_manager::Manager;

use crate::config::AppConfig;
use crate::play::build_registry;

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Start { url: String, quality: Option<String> },
    Stop { port: u16 },
    List,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_line(line: &str) -> ReplCommand {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return ReplCommand::Empty;
    };
    match command {
        "start" => {
            let Some(url) = words.next() else {
                return ReplCommand::Invalid("usage: start <url> [quality]".to_owned());
            };
            ReplCommand::Start {
                url: url.to_owned(),
                quality: words.next().map(str::to_owned),
            }
        }
        "stop" => match words.next().map(str::parse::<u16>) {
            Some(Ok(port)) => ReplCommand::Stop { port },
            Some(Err(_)) | None => ReplCommand::Invalid("usage: stop <port>".to_owned()),
        },
        "list" => ReplCommand::List,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("unknown command `{other}`; try `help`")),
    }
}

const HELP: &str = "\
commands:
  start <url> [quality]   start a relay session, prints its port
  stop <port>             stop the session on a port
  list                    show sessions and their status
  help                    this text
  quit                    stop everything and exit";

pub async fn run(config: &AppConfig) -> Result<()> {
    let registry = build_registry(config)?;
    let plugins = registry.plugin_names().collect::<Vec<_>>().join(", ");
    let manager = Manager::new(registry, config.manager_config(None)?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("sluice manage mode (plugins: {plugins}); `help` lists commands");
    loop {
        print!("sluice> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_line(&line) {
            ReplCommand::Start { url, quality } => {
                match manager.start(&url, quality.as_deref()).await {
                    Ok(port) => println!("started on port {port}"),
                    Err(err) => println!("error: {err}"),
                }
            }
            ReplCommand::Stop { port } => match manager.stop(port).await {
                Ok(()) => println!("stopped {port}"),
                Err(err) => println!("error: {err}"),
            },
            ReplCommand::List => {
                let sessions = manager.list();
                if sessions.is_empty() {
                    println!("no sessions");
                }
                for session in sessions {
                    println!(
                        "{:5}  {:8}  {}  [{}]",
                        session.port, session.status, session.url, session.quality
                    );
                }
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Empty => {}
            ReplCommand::Invalid(message) => println!("{message}"),
        }
    }
    println!("shutting down");
    manager.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_commands() {
        assert_eq!(
            parse_line("start http://example.com/live 720p"),
            ReplCommand::Start {
                url: "http://example.com/live".to_owned(),
                quality: Some("720p".to_owned()),
            }
        );
        assert_eq!(
            parse_line("start http://example.com/live"),
            ReplCommand::Start {
                url: "http://example.com/live".to_owned(),
                quality: None,
            }
        );
        assert_eq!(parse_line("stop 42000"), ReplCommand::Stop { port: 42000 });
        assert_eq!(parse_line("  list  "), ReplCommand::List);
        assert_eq!(parse_line("exit"), ReplCommand::Quit);
        assert_eq!(parse_line(""), ReplCommand::Empty);
    }

    #[test]
    fn bad_input_is_reported_not_fatal() {
        assert!(matches!(parse_line("start"), ReplCommand::Invalid(_)));
        assert!(matches!(parse_line("stop"), ReplCommand::Invalid(_)));
        assert!(matches!(parse_line("stop nine"), ReplCommand::Invalid(_)));
        assert!(matches!(parse_line("frobnicate"), ReplCommand::Invalid(_)));
    }
}
