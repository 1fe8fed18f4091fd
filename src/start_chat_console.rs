//! Startup helpers for the chat console binary.
//!
//! Configuration comes from `CHAT_CONSOLE_*` env vars (optionally seeded by a
//! JSON file). Logs go to stderr so stdout carries only the transcript.

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

use crate::chat::{
    ChatConfig, ConnectionState, Connector, Credentials, SessionController, SessionSnapshot,
    WebSocketConnector,
};

/// Run the console until Ctrl-C, or until stdin is exhausted and the
/// connection has ended.
///
/// # Returns
/// `ExitCode::SUCCESS` on a normal exit, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    info!("Starting chat console v{}", env!("CARGO_PKG_VERSION"));

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_console(config)) {
        error!("Console error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Initialize tracing with an env-driven filter, writing to stderr.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Bridge one session to stdin/stdout.
///
/// A line ending in `\` continues the message on the next line.
///
/// # Errors
/// Returns an error if the session cannot be created or stdio fails.
pub async fn run_console(config: ChatConfig) -> anyhow::Result<()> {
    let credentials = Credentials::new(config.token.clone());
    let session = SessionController::new(&config, WebSocketConnector, credentials)
        .context("failed to create chat session")?;
    drive_console(session).await
}

async fn drive_console<C: Connector>(mut session: SessionController<C>) -> anyhow::Result<()> {
    session
        .mount(&BTreeMap::new())
        .context("failed to mount chat session")?;

    let mut snapshots = session.subscribe();
    let mut printer = TranscriptPrinter::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut input_open = true;

    loop {
        if !input_open && !session.is_live() {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if input_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => match line.strip_suffix('\\') {
                        Some(partial) => session.push_input_line(partial),
                        None => {
                            session.push_input_line(&line);
                            session.submit_pending();
                        }
                    },
                    None => input_open = false,
                }
            }
            _ = session.next_event(), if session.is_live() => {}
        }

        if snapshots.has_changed().unwrap_or(false) {
            let snapshot = snapshots.borrow_and_update().clone();
            let rendered = printer.render(&snapshot);
            if !rendered.is_empty() {
                stdout.write_all(rendered.as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }

    session.close();
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Turns successive snapshots into the text not yet printed.
#[derive(Debug, Default)]
struct TranscriptPrinter {
    entries: usize,
    tail_len: usize,
    status: ConnectionState,
}

impl TranscriptPrinter {
    fn render(&mut self, snapshot: &SessionSnapshot) -> String {
        if snapshot.status != self.status {
            info!(status = snapshot.status.status_text(), "connection status");
            self.status = snapshot.status;
        }

        let mut out = String::new();
        if let Some(tail) = self
            .entries
            .checked_sub(1)
            .and_then(|idx| snapshot.transcript.get(idx))
        {
            let content = tail.content();
            if content.len() > self.tail_len {
                out.push_str(&content[self.tail_len..]);
                self.tail_len = content.len();
            }
        }

        for entry in snapshot.transcript.iter().skip(self.entries) {
            if self.entries > 0 {
                out.push('\n');
            }
            out.push_str(entry.role().as_str());
            out.push_str("> ");
            out.push_str(entry.content());
            self.entries += 1;
            self.tail_len = entry.content().len();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::TranscriptStore;

    fn snapshot(store: &TranscriptStore) -> SessionSnapshot {
        SessionSnapshot {
            transcript: store.snapshot(),
            status: ConnectionState::Connected,
        }
    }

    #[test]
    fn test_printer_emits_only_new_text() {
        let mut store = TranscriptStore::new();
        let mut printer = TranscriptPrinter::default();

        store.push_user("hi");
        assert_eq!(printer.render(&snapshot(&store)), "user> hi");

        store.open_agent("Hel");
        assert_eq!(printer.render(&snapshot(&store)), "\nagent> Hel");

        store.append_to_open("lo");
        assert_eq!(printer.render(&snapshot(&store)), "lo");
        assert_eq!(printer.render(&snapshot(&store)), "");
    }
}
