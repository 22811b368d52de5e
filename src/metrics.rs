//! Metric line sink for probe output.

use std::fmt::Display;
use std::sync::Mutex;

/// Collects the metric lines produced during one scrape.
///
/// Workers running on separate tasks share one writer; every sample is
/// appended under a lock as a whole line, so concurrent writes never
/// interleave partial lines.
#[derive(Default)]
pub struct MetricsWriter {
    buf: Mutex<String>,
}

impl MetricsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample line: `name{label="value",...} value`.
    pub fn sample<V: Display>(&self, name: &str, labels: &[(&str, &str)], value: V) {
        let mut line = String::with_capacity(64);
        line.push_str(name);
        if !labels.is_empty() {
            line.push('{');
            for (i, (key, val)) in labels.iter().enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(key);
                line.push_str("=\"");
                line.push_str(val);
                line.push('"');
            }
            line.push('}');
        }
        line.push(' ');
        line.push_str(&value.to_string());
        line.push('\n');

        self.buf.lock().unwrap().push_str(&line);
    }

    /// Render everything written so far.
    pub fn render(&self) -> String {
        self.buf.lock().unwrap().clone()
    }
}
