//! Process-wide engine log redirection.
//!
//! Engines are chatty on stderr by default. This sink lets an embedding
//! application redirect that stream to a file or silence it entirely.
//! The state is global because the underlying engine's callback is.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use parking_lot::Mutex;

enum LogSink {
    /// Forward to stderr (the engine's native behavior).
    Default,
    /// Append to an open file.
    File(File),
    /// Drop everything.
    Disabled,
}

static SINK: Mutex<LogSink> = Mutex::new(LogSink::Default);

/// Redirect engine log output to `path`, appending and creating the
/// file as needed. Replaces any previously installed file sink.
pub fn log_to_file(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    *SINK.lock() = LogSink::File(file);
    Ok(())
}

/// Silence engine log output.
pub fn log_disable() {
    *SINK.lock() = LogSink::Disabled;
}

/// Restore the default stderr sink.
pub fn log_restore_default() {
    *SINK.lock() = LogSink::Default;
}

/// Deliver one log line through the installed sink. Called by engine
/// implementations; write failures are swallowed.
pub fn emit(text: &str) {
    let mut sink = SINK.lock();
    match &mut *sink {
        LogSink::Default => eprint!("{text}"),
        LogSink::File(file) => {
            let _ = file.write_all(text.as_bytes());
            let _ = file.flush();
        }
        LogSink::Disabled => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // One sequential scenario: the sink is process-global, so separate
    // tests would race each other under the parallel test runner.
    #[test]
    fn sink_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");

        log_to_file(&path).unwrap();
        emit("alpha\n");

        log_disable();
        emit("beta\n");

        log_restore_default();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("alpha"));
        assert!(!contents.contains("beta"));
    }
}
