//! Newline-delimited JSON progress streams (image pull and build).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Splits a chunked byte stream into complete lines.
#[derive(Debug, Default)]
pub struct JsonLines {
    buf: Vec<u8>,
}

impl JsonLines {
    /// Feed a chunk; returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = trim_line(&line);
            if !line.is_empty() {
                lines.push(line.to_vec());
            }
        }
        lines
    }

    /// Any trailing line without a newline.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        let rest = trim_line(&rest);
        (!rest.is_empty()).then(|| rest.to_vec())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    &line[..end]
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullEvent {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub progress_detail: ProgressDetail,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
}

/// Folds pull events into per-layer byte counts and status transitions.
#[derive(Debug, Default)]
pub struct PullTracker {
    layers: BTreeMap<String, ProgressDetail>,
    last_status: String,
}

impl PullTracker {
    /// Record an event; returns a line worth showing to the operator.
    ///
    /// Layer-level events only update counters. Top-level status changes are
    /// surfaced, except digest and final status lines.
    pub fn observe(&mut self, event: &PullEvent) -> EngineResult<Option<String>> {
        if !event.error.is_empty() {
            return Err(EngineError::Stream(format!("pull failed: {}", event.error)));
        }
        if !event.id.is_empty() {
            if event.progress_detail.total > 0 {
                self.layers.insert(event.id.clone(), event.progress_detail);
            }
            return Ok(None);
        }
        if event.status == self.last_status {
            return Ok(None);
        }
        self.last_status = event.status.clone();
        if event.status.contains("Digest:") || event.status.contains("Status:") {
            return Ok(None);
        }
        Ok(Some(event.status.clone()))
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// `(current, total)` bytes across every tracked layer.
    pub fn bytes(&self) -> (u64, u64) {
        self.layers
            .values()
            .fold((0, 0), |(c, t), d| (c + d.current, t + d.total))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildEvent {
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub aux: Option<BuildAux>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildAux {
    #[serde(rename = "ID", default)]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_span_chunks() {
        let mut lines = JsonLines::default();
        assert!(lines.push(b"{\"status\":\"Pul").is_empty());
        let done = lines.push(b"ling\"}\r\n{\"status\":\"x\"}\n\n{\"st");
        assert_eq!(done, vec![b"{\"status\":\"Pulling\"}".to_vec(), b"{\"status\":\"x\"}".to_vec()]);
        assert_eq!(lines.finish(), Some(b"{\"st".to_vec()));
        assert_eq!(lines.finish(), None);
    }

    fn event(raw: &str) -> PullEvent {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn tracker_reports_status_transitions_only() {
        let mut tracker = PullTracker::default();
        let shown: Vec<String> = [
            r#"{"status":"Pulling from library/nginx","id":"alpine"}"#,
            r#"{"status":"Pulling fs layer","id":"a1"}"#,
            r#"{"status":"Downloading","id":"a1","progressDetail":{"current":50,"total":100}}"#,
            r#"{"status":"Downloading","id":"b2","progressDetail":{"current":10,"total":40}}"#,
            r#"{"status":"Pulling image"}"#,
            r#"{"status":"Pulling image"}"#,
            r#"{"status":"Digest: sha256:abc"}"#,
            r#"{"status":"Status: Downloaded newer image for nginx:alpine"}"#,
        ]
        .iter()
        .filter_map(|raw| tracker.observe(&event(raw)).unwrap())
        .collect();

        assert_eq!(shown, vec!["Pulling image".to_string()]);
        assert_eq!(tracker.layer_count(), 2);
        assert_eq!(tracker.bytes(), (60, 140));
    }

    #[test]
    fn tracker_surfaces_errors() {
        let mut tracker = PullTracker::default();
        let err = tracker
            .observe(&event(r#"{"error":"manifest unknown"}"#))
            .unwrap_err();
        assert!(err.to_string().contains("manifest unknown"));
    }

    #[test]
    fn build_events_decode() {
        let ev: BuildEvent = serde_json::from_str(r#"{"aux":{"ID":"sha256:feed"}}"#).unwrap();
        assert_eq!(ev.aux.unwrap().id, "sha256:feed");
        let ev: BuildEvent = serde_json::from_str(r#"{"stream":"Step 1/3 : FROM alpine\n"}"#).unwrap();
        assert!(ev.stream.starts_with("Step 1/3"));
    }
}
