//! Making sense of the progress `git` reports while cloning.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::sync::{LazyLock, Mutex};

/// The stages of a clone we keep track of.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    ReceivingObjects,
    ResolvingDeltas,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::ReceivingObjects, Phase::ResolvingDeltas];

    /// The label `git` uses for this phase.
    pub fn label(self) -> &'static str {
        match self {
            Phase::ReceivingObjects => "Receiving objects",
            Phase::ResolvingDeltas => "Resolving deltas",
        }
    }

    fn from_label(label: &str) -> Option<Phase> {
        Phase::ALL.iter().cloned().find(|p| p.label() == label)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One progress update, e.g. `Receiving objects:  42% (420/1000)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent: u8,
    pub count: u64,
    pub total: u64,
    /// Whether `git` said this phase is `done.`
    pub done: bool,
}

/// The most recent percentage seen for each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    percentages: BTreeMap<Phase, u8>,
}

impl ProgressState {
    pub fn get(&self, phase: Phase) -> Option<u8> {
        self.percentages.get(&phase).cloned()
    }

    fn update(&mut self, event: &ProgressEvent) {
        self.percentages.insert(event.phase, event.percent);
    }
}

impl Display for ProgressState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, phase) in Phase::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}: {}%", phase, self.get(*phase).unwrap_or(0))?;
        }

        Ok(())
    }
}

/// An incremental parser which turns chunks of `git` output into
/// [`ProgressEvent`]s, remembering the latest percentage for each phase.
///
/// Anything which isn't a recognised progress update is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    state: ProgressState,
}

impl ProgressParser {
    pub fn new() -> ProgressParser {
        ProgressParser::default()
    }

    /// Classify a chunk of output, returning any progress updates it
    /// contained.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressEvent> {
        static PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(Receiving objects|Resolving deltas):\s*(\d{1,3})%\s*\((\d+)/(\d+)\)([^\r\n]*)")
                .expect("valid regex")
        });

        let mut events = Vec::new();

        for caps in PROGRESS.captures_iter(chunk) {
            let parsed = Phase::from_label(&caps[1]).and_then(|phase| {
                Some(ProgressEvent {
                    phase,
                    percent: caps[2].parse().ok()?,
                    count: caps[3].parse().ok()?,
                    total: caps[4].parse().ok()?,
                    done: caps[5].contains("done"),
                })
            });

            if let Some(event) = parsed {
                self.state.update(&event);
                events.push(event);
            }
        }

        events
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Stop parsing, handing back the final state.
    pub fn finish(self) -> ProgressState {
        self.state
    }
}

/// The one place progress is rendered to.
///
/// Every clone shares the same sink, so concurrent clones overwrite each
/// other's status line.
pub trait ProgressSink: Send + Sync {
    /// Replace the current status line.
    fn replace_line(&self, line: &str);
    /// Leave the current status line in place and start a new one.
    fn finish_line(&self);
    /// Print a message on a line of its own.
    fn message(&self, msg: &str);
}

/// A [`ProgressSink`] which writes to stdout.
#[derive(Debug, Default)]
pub struct TerminalSink;

impl TerminalSink {
    fn write(&self, text: &str) {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        // a broken stdout isn't worth aborting a clone over
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

impl ProgressSink for TerminalSink {
    fn replace_line(&self, line: &str) {
        self.write(&format!("\r\x1b[2K{}", line));
    }

    fn finish_line(&self) {
        self.write("\n");
    }

    fn message(&self, msg: &str) {
        self.write(&format!("{}\n", msg));
    }
}

/// Something written to a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Replace(String),
    Finish,
    Message(String),
}

/// A [`ProgressSink`] which records everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressSink for MemorySink {
    fn replace_line(&self, line: &str) {
        self.push(SinkEvent::Replace(line.to_string()));
    }

    fn finish_line(&self) {
        self.push(SinkEvent::Finish);
    }

    fn message(&self, msg: &str) {
        self.push(SinkEvent::Message(msg.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_receiving_and_resolving() {
        let mut parser = ProgressParser::new();

        let first = parser.feed("Receiving objects: 42% (420/1000)");
        let second = parser.feed("Resolving deltas: 100% (10/10), done.");

        assert_eq!(
            first,
            vec![ProgressEvent {
                phase: Phase::ReceivingObjects,
                percent: 42,
                count: 420,
                total: 1000,
                done: false,
            }]
        );
        assert_eq!(second.len(), 1);
        assert!(second[0].done);

        let state = parser.finish();
        assert_eq!(state.get(Phase::ReceivingObjects), Some(42));
        assert_eq!(state.get(Phase::ResolvingDeltas), Some(100));
    }

    #[test]
    fn a_chunk_can_hold_several_updates() {
        let mut parser = ProgressParser::new();
        let chunk = "Receiving objects:   1% (1/100)\rReceiving objects:  57% (57/100), 1.20 MiB | 2.40 MiB/s\r";

        let got = parser.feed(chunk);

        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| !e.done));
        assert_eq!(parser.state().get(Phase::ReceivingObjects), Some(57));
    }

    #[test]
    fn everything_else_is_ignored() {
        let mut parser = ProgressParser::new();
        let inputs = vec![
            "Cloning into 'widget'...\n",
            "remote: Enumerating objects: 5, done.\n",
            "remote: Counting objects: 100% (5/5), done.\n",
            "Receiving obj",
            "fatal: repository 'https://example.org/nope' not found\n",
        ];

        for src in inputs {
            assert!(parser.feed(src).is_empty(), "{:?}", src);
        }

        assert_eq!(parser.state(), &ProgressState::default());
    }

    #[test]
    fn render_both_phases() {
        let mut parser = ProgressParser::new();
        parser.feed("Receiving objects: 42% (420/1000)");

        let got = parser.state().to_string();

        assert_eq!(got, "Receiving objects: 42% | Resolving deltas: 0%");
    }

    #[test]
    fn the_memory_sink_remembers_everything() {
        let sink = MemorySink::new();

        sink.replace_line("a");
        sink.replace_line("b");
        sink.finish_line();
        sink.message("c");

        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Replace(String::from("a")),
                SinkEvent::Replace(String::from("b")),
                SinkEvent::Finish,
                SinkEvent::Message(String::from("c")),
            ]
        );
    }
}
