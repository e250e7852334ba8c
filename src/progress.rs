//! Turn progress reporting for the terminal client.
//!
//! Reports what `qbx ask` and `qbx chat` are doing while a question is in
//! flight: waiting on the model, answered, failed, or answered but not saved.
//! Progress is emitted on **stderr** so stdout carries only the answer text.

use std::io::Write;

/// A single lifecycle event for one question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    /// The request is on its way to the model.
    Thinking { model: String },
    /// The model answered; `chars` is the answer length.
    Answered { chars: usize },
    /// The request failed and the apology was shown.
    Failed,
    /// The answer could not be saved to the library.
    NotSaved { reason: String },
}

/// Reports turn progress. Implementations write to stderr (human or JSON).
pub trait TurnReporter: Send + Sync {
    fn report(&self, event: TurnEvent);
}

/// Human-friendly progress on stderr: "ask  thinking (openai/gpt-3.5-turbo)...".
pub struct StderrProgress;

impl TurnReporter for StderrProgress {
    fn report(&self, event: TurnEvent) {
        let line = match &event {
            TurnEvent::Thinking { model } => format!("ask  thinking ({})...\n", model),
            TurnEvent::Answered { chars } => {
                format!("ask  answered  {} chars\n", format_number(*chars as u64))
            }
            TurnEvent::Failed => "ask  failed\n".to_string(),
            TurnEvent::NotSaved { reason } => format!("ask  not saved to library: {}\n", reason),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl TurnReporter for JsonProgress {
    fn report(&self, event: TurnEvent) {
        let obj = match &event {
            TurnEvent::Thinking { model } => serde_json::json!({
                "event": "turn",
                "phase": "thinking",
                "model": model
            }),
            TurnEvent::Answered { chars } => serde_json::json!({
                "event": "turn",
                "phase": "answered",
                "chars": chars
            }),
            TurnEvent::Failed => serde_json::json!({
                "event": "turn",
                "phase": "failed"
            }),
            TurnEvent::NotSaved { reason } => serde_json::json!({
                "event": "turn",
                "phase": "not_saved",
                "reason": reason
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl TurnReporter for NoProgress {
    fn report(&self, _event: TurnEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn TurnReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn modes_build_reporters() {
        for mode in [ProgressMode::Off, ProgressMode::Human, ProgressMode::Json] {
            mode.reporter().report(TurnEvent::Failed);
        }
    }
}
