//! Resume markers
//!
//! A resume marker tells the permanent-data lane where enumeration last
//! stopped: a month shard (`YYMM`), a day within it, and the list of
//! `SHOT/FILE` entries the replica already acknowledged for that day.
//! Markers travel over the wire as a single pipe-separated line, so the
//! codec is deliberately trivial and strict: a malformed marker from the
//! remote aborts the reset step rather than silently skipping data.

use shotdb_core::{ShotError, ShotResult};

/// Replication resume position exchanged with the replica.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumeMarker {
    /// Month shard (`YYMM`); empty means "from the beginning"
    pub month: String,
    /// Day of month (1..=31); 0 means "from the start of the month"
    pub day: u32,
    /// `SHOT/FILE` entries already acknowledged within the marker's day
    pub done: Vec<String>,
}

impl ResumeMarker {
    /// Marker pointing at the very beginning of the archive.
    pub fn start() -> Self {
        Self::default()
    }

    /// Parse the wire form `month|day|entry,entry,...`.
    ///
    /// # Errors
    ///
    /// `SyncState` on a malformed month, day, or done entry — a bad marker
    /// must abort the reset rather than cause data to be skipped.
    pub fn from_wire(raw: &str) -> ShotResult<Self> {
        let mut parts = raw.splitn(3, '|');
        let month = parts.next().unwrap_or_default().to_string();
        let day_part = parts
            .next()
            .ok_or_else(|| ShotError::SyncState(format!("resume marker missing day: {raw:?}")))?;
        let done_part = parts.next().unwrap_or_default();

        if !month.is_empty() && (month.len() != 4 || !month.bytes().all(|b| b.is_ascii_digit())) {
            return Err(ShotError::SyncState(format!(
                "resume marker month must be 4 digits, got {month:?}"
            )));
        }
        let day: u32 = day_part
            .parse()
            .map_err(|_| ShotError::SyncState(format!("resume marker day not numeric: {day_part:?}")))?;
        if day > 31 {
            return Err(ShotError::SyncState(format!(
                "resume marker day out of range: {day}"
            )));
        }

        let mut done = Vec::new();
        for entry in done_part.split(',').filter(|e| !e.is_empty()) {
            if !entry.contains('/') {
                return Err(ShotError::SyncState(format!(
                    "resume marker entry not SHOT/FILE: {entry:?}"
                )));
            }
            done.push(entry.to_string());
        }
        Ok(Self { month, day, done })
    }

    /// Serialize to the wire form.
    pub fn to_wire(&self) -> String {
        format!("{}|{}|{}", self.month, self.day, self.done.join(","))
    }

    /// True when the replica already acknowledged this shot/file pair.
    pub fn is_done(&self, shot: &str, file: &str) -> bool {
        let entry = format!("{shot}/{file}");
        self.done.iter().any(|e| e == &entry)
    }

    /// Record an acknowledged shot/file pair.
    pub fn mark_done(&mut self, shot: &str, file: &str) {
        let entry = format!("{shot}/{file}");
        if !self.done.contains(&entry) {
            self.done.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        let mut marker = ResumeMarker {
            month: "2401".to_string(),
            day: 15,
            done: vec![],
        };
        marker.mark_done("240115E01", "0012.000");
        marker.mark_done("240115E01", "0013.000");
        let wire = marker.to_wire();
        assert_eq!(wire, "2401|15|240115E01/0012.000,240115E01/0013.000");
        assert_eq!(ResumeMarker::from_wire(&wire).unwrap(), marker);
    }

    #[test]
    fn test_start_marker() {
        let marker = ResumeMarker::start();
        assert_eq!(marker.to_wire(), "|0|");
        let parsed = ResumeMarker::from_wire("|0|").unwrap();
        assert_eq!(parsed, marker);
    }

    #[test]
    fn test_is_done() {
        let marker = ResumeMarker::from_wire("2401|15|240115E01/0012.000").unwrap();
        assert!(marker.is_done("240115E01", "0012.000"));
        assert!(!marker.is_done("240115E01", "0013.000"));
        assert!(!marker.is_done("240115E02", "0012.000"));
    }

    #[test]
    fn test_mark_done_deduplicates() {
        let mut marker = ResumeMarker::start();
        marker.mark_done("240115E01", "0012.000");
        marker.mark_done("240115E01", "0012.000");
        assert_eq!(marker.done.len(), 1);
    }

    #[test]
    fn test_malformed_markers_rejected() {
        assert!(ResumeMarker::from_wire("2401").is_err(), "missing day");
        assert!(ResumeMarker::from_wire("24x1|5|").is_err(), "month not digits");
        assert!(ResumeMarker::from_wire("2401|notaday|").is_err());
        assert!(ResumeMarker::from_wire("2401|42|").is_err(), "day out of range");
        assert!(
            ResumeMarker::from_wire("2401|15|justafile").is_err(),
            "entry without shot"
        );
    }
}
