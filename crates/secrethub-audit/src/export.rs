//! Canonical CSV export.
//!
//! UTF-8, `\n` line endings, comma separator, RFC-4180 quoting, header
//! row, fixed column order:
//!
//! `timestamp,event_type,actor_type,actor_id,secret_id,access_granted,policy_matched,denial_reason,source_ip,correlation_id`

use chrono::SecondsFormat;
use secrethub_storage::AuditEventRecord;

/// The fixed export header.
pub const CSV_HEADER: &str = "timestamp,event_type,actor_type,actor_id,secret_id,access_granted,policy_matched,denial_reason,source_ip,correlation_id";

/// Render events into the canonical CSV document.
#[must_use]
pub fn to_csv(events: &[AuditEventRecord]) -> String {
    let mut out = String::with_capacity(events.len() * 128 + CSV_HEADER.len() + 1);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for event in events {
        let fields = [
            event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.event_type.clone(),
            event.actor_type.to_string(),
            event.actor_id.clone(),
            event
                .secret_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            event
                .access_granted
                .map(|g| g.to_string())
                .unwrap_or_default(),
            event.policy_name.clone().unwrap_or_default(),
            event.denial_reason.clone().unwrap_or_default(),
            event.source_ip.clone().unwrap_or_default(),
            event
                .correlation_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ];
        let mut first = true;
        for field in fields {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&quote(&field));
        }
        out.push('\n');
    }
    out
}

/// RFC-4180 field quoting: wrap in double quotes when the field contains a
/// comma, quote, CR, or LF, doubling embedded quotes.
fn quote(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        let mut quoted = String::with_capacity(field.len() + 2);
        quoted.push('"');
        for ch in field.chars() {
            if ch == '"' {
                quoted.push('"');
            }
            quoted.push(ch);
        }
        quoted.push('"');
        quoted
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use secrethub_core::{ActorType, EventId};

    fn event(denial_reason: Option<&str>) -> AuditEventRecord {
        AuditEventRecord {
            event_id: EventId::new(),
            sequence: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap(),
            event_type: "secret.access_denied".to_string(),
            actor_type: ActorType::Application,
            actor_id: "billing".to_string(),
            secret_id: None,
            secret_version: None,
            access_granted: Some(false),
            policy_name: None,
            denial_reason: denial_reason.map(String::from),
            source_ip: Some("10.1.2.3".to_string()),
            correlation_id: None,
            previous_hash: "GENESIS".to_string(),
            current_hash: "h".to_string(),
            signature: "s".to_string(),
        }
    }

    #[test]
    fn test_header_and_row() {
        let csv = to_csv(&[event(Some("outside allowed hours"))]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert_eq!(
            row,
            "2024-05-17T12:30:00Z,secret.access_denied,application,billing,,false,,outside allowed hours,10.1.2.3,"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_quoting() {
        let csv = to_csv(&[event(Some("contains, comma and \"quotes\""))]);
        assert!(csv.contains("\"contains, comma and \"\"quotes\"\"\""));
    }

    #[test]
    fn test_newlines_use_lf() {
        let csv = to_csv(&[event(None), event(None)]);
        assert_eq!(csv.matches('\n').count(), 3);
        assert!(!csv.contains("\r\n"));
    }
}
