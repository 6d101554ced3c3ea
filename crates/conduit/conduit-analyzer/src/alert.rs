use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
}

/// One finding, serialized as a flat record tagged by `issue`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum Alert {
    QueueBacklog {
        backlog: i64,
        severity: Severity,
        time: f64,
    },
    PipeHighLatency {
        latency_ms: f64,
        label: Option<String>,
        time: f64,
    },
    PossibleDeadlock {
        reason: String,
        time: f64,
    },
}

impl Alert {
    pub fn issue(&self) -> &'static str {
        match self {
            Alert::QueueBacklog { .. } => "queue_backlog",
            Alert::PipeHighLatency { .. } => "pipe_high_latency",
            Alert::PossibleDeadlock { .. } => "possible_deadlock",
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            Alert::QueueBacklog { time, .. }
            | Alert::PipeHighLatency { time, .. }
            | Alert::PossibleDeadlock { time, .. } => *time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_issue_tagged_record() {
        let alert = Alert::QueueBacklog {
            backlog: 55,
            severity: Severity::High,
            time: 10.5,
        };
        assert_eq!(
            serde_json::to_value(&alert).unwrap(),
            json!({"issue": "queue_backlog", "backlog": 55, "severity": "high", "time": 10.5})
        );
        assert_eq!(alert.issue(), "queue_backlog");
    }

    #[test]
    fn latency_alert_keeps_label() {
        let alert = Alert::PipeHighLatency {
            latency_ms: 600.0,
            label: Some("pipe_receiver_1".into()),
            time: 1.0,
        };
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["issue"], "pipe_high_latency");
        assert_eq!(value["label"], "pipe_receiver_1");
        let back: Alert = serde_json::from_value(value).unwrap();
        assert_eq!(back, alert);
    }
}
