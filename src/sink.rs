use std::sync::mpsc::Sender;

use crate::error::MetricError;
use crate::message::{MetricRegistration, MetricUpdate};

/// The event channel is an external collaborator: "arbitrary sink
/// accepting a `MetricRegistration` or `MetricUpdate` message". This trait
/// is the seam a real transport implements.
pub trait EventSink: Send + Sync {
    fn send_registration(&self, message: MetricRegistration) -> Result<(), MetricError>;
    fn send_update(&self, message: MetricUpdate) -> Result<(), MetricError>;
}

/// Discards every message. Useful for tests and benchmarks that exercise
/// the registry/emitter without a real transport attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send_registration(&self, _message: MetricRegistration) -> Result<(), MetricError> {
        Ok(())
    }

    fn send_update(&self, _message: MetricUpdate) -> Result<(), MetricError> {
        Ok(())
    }
}

/// A message handed to a [`ChannelSink`].
#[derive(Debug)]
pub enum SinkEvent {
    Registration(MetricRegistration),
    Update(MetricUpdate),
}

/// Forwards messages over a `std::sync::mpsc` channel, standing in for the
/// real event-channel transport until one is wired in.
pub struct ChannelSink(Sender<SinkEvent>);

impl ChannelSink {
    pub fn new(sender: Sender<SinkEvent>) -> Self {
        Self(sender)
    }
}

impl EventSink for ChannelSink {
    fn send_registration(&self, message: MetricRegistration) -> Result<(), MetricError> {
        self.0
            .send(SinkEvent::Registration(message))
            .map_err(|err| MetricError::EmitFailed(err.to_string()))
    }

    fn send_update(&self, message: MetricUpdate) -> Result<(), MetricError> {
        self.0
            .send(SinkEvent::Update(message))
            .map_err(|err| MetricError::EmitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MetricRegistration, MetricUpdate};

    #[test]
    fn null_sink_always_succeeds() {
        let sink = NullSink;
        assert!(sink
            .send_registration(MetricRegistration {
                metrics: vec![],
                stages: vec![]
            })
            .is_ok());
        assert!(sink
            .send_update(MetricUpdate {
                metrics: vec![],
                stage_timing: vec![]
            })
            .is_ok());
    }

    #[test]
    fn channel_sink_forwards_and_reports_closed_receiver() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.send_registration(MetricRegistration {
            metrics: vec![],
            stages: vec![],
        })
        .unwrap();
        assert!(matches!(rx.recv().unwrap(), SinkEvent::Registration(_)));
        drop(rx);
        let err = sink
            .send_update(MetricUpdate {
                metrics: vec![],
                stage_timing: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, MetricError::EmitFailed(_)));
    }
}
