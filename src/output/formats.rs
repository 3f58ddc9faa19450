//! Snapshot renderings

use serde::Serialize;

use super::format_timestamp;
use crate::calibration::RunMode;
use crate::monitor::Snapshot;

/// JSON output structure, one per block
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    iteration: u64,
    elapsed_ms: i64,
    mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    likelihood: Option<f64>,
    raw: f64,
    smoothed: f64,
    reference: f64,
    recorded: usize,
    alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<JsonHistory<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonHistory<'a> {
    reduced: &'a [f64],
    running_average: &'a [f64],
}

/// Status line: what is being detected, or what is being recorded
pub fn format_status(snapshot: &Snapshot) -> String {
    match (&snapshot.mode, &snapshot.classification) {
        (RunMode::Recording { target }, _) => {
            format!("Recording {} ({} samples)", target, snapshot.recorded)
        }
        (RunMode::Running, Some(c)) => {
            format!("Detecting {}, best likelihood: {:.3}", c.label(), c.likelihood)
        }
        (RunMode::Running, None) => "Detecting".to_string(),
    }
}

/// Status line with timestamp, levels and a history sparkline
pub fn format_text(snapshot: &Snapshot) -> String {
    let mut line = format!(
        "[{}] {} | rms {:.4} avg {:.4} ref {:.4} {}",
        format_timestamp(snapshot.elapsed_ms),
        format_status(snapshot),
        snapshot.raw,
        snapshot.smoothed,
        snapshot.reference,
        sparkline(&snapshot.running_average, 24),
    );
    if snapshot.alert {
        line.push_str(" [ALERT]");
    }
    line
}

/// Format as a JSON line; histories are included on request
pub fn format_json(snapshot: &Snapshot, include_history: bool) -> String {
    let (mode, target) = match snapshot.mode {
        RunMode::Running => ("running", None),
        RunMode::Recording { ref target } => ("recording", Some(target.as_str())),
    };

    let output = JsonOutput {
        iteration: snapshot.iteration,
        elapsed_ms: snapshot.elapsed_ms,
        mode,
        target,
        label: snapshot.classification.as_ref().map(|c| c.label()),
        likelihood: snapshot.classification.as_ref().map(|c| c.likelihood),
        raw: snapshot.raw,
        smoothed: snapshot.smoothed,
        reference: snapshot.reference,
        recorded: snapshot.recorded,
        alert: snapshot.alert,
        history: include_history.then(|| JsonHistory {
            reduced: &snapshot.reduced_history,
            running_average: &snapshot.running_average,
        }),
    };

    serde_json::to_string(&output)
        .unwrap_or_else(|_| format!("{{\"iteration\": {}}}", snapshot.iteration))
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// The last `width` values scaled between their own min and max
pub fn sparkline(values: &[f64], width: usize) -> String {
    let start = values.len().saturating_sub(width);
    let tail = &values[start..];
    if tail.is_empty() {
        return String::new();
    }

    let min = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let max = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    tail.iter()
        .map(|v| {
            if !(span > 0.0) {
                return BARS[0];
            }
            let level = ((v - min) / span * (BARS.len() - 1) as f64).round() as usize;
            BARS[level.min(BARS.len() - 1)]
        })
        .collect()
}
