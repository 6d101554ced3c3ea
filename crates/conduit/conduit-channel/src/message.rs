/// Unit of traffic on pipes and queues: a payload plus the sender's clock.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub payload: String,
    /// Wall clock seconds captured just before the send.
    pub sent_ts: f64,
}

impl Message {
    pub fn new(payload: impl Into<String>, sent_ts: f64) -> Self {
        Self {
            payload: payload.into(),
            sent_ts,
        }
    }
}
