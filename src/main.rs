//! Binary entrypoint that launches the streaming chat console.

use std::process::ExitCode;

use chat_stream_console::start_chat_console;

/// Open one chat session and bridge it to stdin/stdout.
fn main() -> ExitCode {
    start_chat_console::run()
}
