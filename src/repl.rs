//! Line-oriented terminal front-end
//!
//! Reads commands and messages from stdin, drives the session and prints
//! replies. Status entries stream to stderr as they are pushed. Ctrl-C
//! during a run cancels it.

mod render;
mod terminal;

pub use terminal::TerminalDisplay;

use crate::session::{RunOutcome, Session, SessionEvent, ThreadResolution};
use crate::state_machine::Owner;
use render::render_message;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::broadcast::error::RecvError;

const HELP: &str = "\
Commands:
  /init <api key>   initialize the assistant client
  /reset            forget the current thread and start a new one
  /thread [id]      show the current thread, or switch to another
  /status           show the status log
  /history          show the conversation
  /actions          list the actions the assistant may request
  /help             show this help
  /quit             exit
Anything else is sent to the assistant. Ctrl-C cancels a running reply,
and exits at the prompt.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Init(String),
    Reset,
    Thread(Option<String>),
    Status,
    History,
    Actions,
    Help,
    Quit,
    Send(String),
    Empty,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(n, a)| (n, a.trim()));
    match (name, arg) {
        ("init", "") => Err("usage: /init <api key>".to_string()),
        ("init", key) => Ok(Command::Init(key.to_string())),
        ("reset", _) => Ok(Command::Reset),
        ("thread", "") => Ok(Command::Thread(None)),
        ("thread", id) => Ok(Command::Thread(Some(id.to_string()))),
        ("status", _) => Ok(Command::Status),
        ("history", _) => Ok(Command::History),
        ("actions", _) => Ok(Command::Actions),
        ("help", _) => Ok(Command::Help),
        ("quit" | "exit", _) => Ok(Command::Quit),
        (other, _) => Err(format!("unknown command /{other}, try /help")),
    }
}

pub struct Repl {
    session: Session,
    display: Arc<TerminalDisplay>,
}

impl Repl {
    pub fn new(session: Session, display: Arc<TerminalDisplay>) -> Self {
        Self { session, display }
    }

    /// Run until stdin closes or `/quit`
    pub async fn run(self, api_key: Option<String>) -> io::Result<()> {
        let status_printer = tokio::spawn(print_statuses(self.session.subscribe()));
        for status in self.session.status() {
            eprintln!("  · {status}");
        }

        if let Some(key) = api_key {
            self.init(&key).await;
        } else {
            println!("No OPENAI_API_KEY set. Use /init <api key> to start.");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            io::stdout().flush()?;

            let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? else {
                break;
            };
            match parse_command(&line) {
                Ok(Command::Empty) => {}
                Ok(Command::Quit) => break,
                Ok(Command::Init(key)) => self.init(&key).await,
                Ok(Command::Reset) => self.switch_thread(None).await,
                Ok(Command::Thread(None)) => match self.session.current_thread() {
                    Some(id) => println!("Current thread: {id}"),
                    None => println!("No thread yet."),
                },
                Ok(Command::Thread(Some(id))) => self.switch_thread(Some(id)).await,
                Ok(Command::Status) => {
                    for status in self.session.status() {
                        println!("  · {status}");
                    }
                    println!(
                        "ready: {}, loading: {}",
                        self.session.is_ready(),
                        self.session.loading()
                    );
                    for (name, value) in self.display.properties() {
                        println!("{name}: {value}");
                    }
                }
                Ok(Command::History) => self.print_history(),
                Ok(Command::Actions) => {
                    let definitions = self.session.action_definitions();
                    if definitions.is_empty() {
                        println!("No actions enabled.");
                    }
                    for definition in definitions {
                        println!("{}: {}", definition.name, definition.description);
                    }
                }
                Ok(Command::Help) => println!("{HELP}"),
                Ok(Command::Send(text)) => self.send(&text).await,
                Err(message) => println!("{message}"),
            }
        }

        status_printer.abort();
        self.display.reset();
        Ok(())
    }

    async fn init(&self, api_key: &str) {
        match self.session.initialize(api_key) {
            Ok(()) => self.resolve().await,
            Err(e) => println!("Could not initialize: {e}"),
        }
    }

    async fn switch_thread(&self, thread_id: Option<String>) {
        if let Err(e) = self.session.set_current_thread(thread_id).await {
            println!("Could not change thread: {e}");
            return;
        }
        self.resolve().await;
    }

    async fn resolve(&self) {
        match self.session.resolve_thread().await {
            Ok(ThreadResolution::NoClient) => {
                println!("No API key yet. Use /init <api key> to start.");
            }
            Ok(ThreadResolution::Created { thread_id }) => {
                println!("Started thread {thread_id}");
            }
            Ok(ThreadResolution::Resumed {
                thread_id,
                message_count,
            }) => {
                println!("Resumed thread {thread_id} ({message_count} messages)");
                self.print_history();
            }
            Ok(ThreadResolution::Unresolved { reason }) => {
                println!("Thread not available: {reason}");
            }
            Err(e) => println!("Could not resolve thread: {e}"),
        }
    }

    async fn send(&self, text: &str) {
        let before = self.session.messages().len();

        let send = self.session.send_message(text);
        tokio::pin!(send);
        let result = loop {
            tokio::select! {
                result = &mut send => break result,
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                        break (&mut send).await;
                    }
                    if self.session.cancel_run() {
                        eprintln!("  · Cancelling...");
                    }
                }
            }
        };

        match result {
            Ok(Some(RunOutcome::Completed)) => self.print_replies(before),
            Ok(Some(RunOutcome::Stalled { reason })) => println!("(run stalled: {reason})"),
            Ok(Some(RunOutcome::Cancelled)) => println!("(run cancelled)"),
            Ok(None) => println!("Not ready yet. Use /init <api key> first."),
            Err(e) => println!("Error: {e}"),
        }
    }

    fn print_replies(&self, from: usize) {
        for message in self.session.messages().iter().skip(from) {
            if message.owner == Owner::Assistant {
                println!("{}", render_message(message));
            }
        }
    }

    fn print_history(&self) {
        for message in &self.session.messages() {
            println!("{}", render_message(message));
        }
    }
}

/// Next input line, or `None` on end of input or when `interrupt` fires first
async fn next_input<R, I>(lines: &mut Lines<R>, interrupt: I) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = io::Result<()>>,
{
    tokio::select! {
        line = lines.next_line() => line,
        signal = interrupt => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                return lines.next_line().await;
            }
            println!();
            Ok(None)
        }
    }
}

async fn print_statuses(mut events: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StatusPushed(status)) => eprintln!("  · {status}"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Status printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
