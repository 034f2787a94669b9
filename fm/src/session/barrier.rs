//! Startup synchronization barrier
//!
//! One federate registers the point; everyone waits for the announcement,
//! achieves it, then blocks until the whole federation is synchronized.

use tracing::debug;

use rtilink::RtiClient;

use crate::errors::{FedError, protocol};

use super::PUMP_WAIT;
use super::sink::CallbackSink;

pub struct Barrier {
    label: String,
    register: bool,
}

impl Barrier {
    pub fn new(label: impl Into<String>, register: bool) -> Self {
        Self {
            label: label.into(),
            register,
        }
    }

    pub fn cross(&self, client: &mut dyn RtiClient, sink: &mut CallbackSink) -> Result<(), FedError> {
        debug!(label = %self.label, register = self.register, "Barrier::cross: called");
        if self.register {
            client
                .register_sync_point(&self.label, &self.label)
                .map_err(protocol("register sync point"))?;
            loop {
                if let Some(fault) = sink.take_fault() {
                    return Err(fault);
                }
                match sink.registration_outcome(&self.label) {
                    Some(true) => break,
                    Some(false) => {
                        return Err(FedError::BarrierRegistrationFailed {
                            label: self.label.clone(),
                        });
                    }
                    None => {
                        client.tick(sink, PUMP_WAIT).map_err(protocol("evoke callbacks"))?;
                    }
                }
            }
        }
        // announcement reaches the registrar too, so everyone waits here
        while !sink.is_announced(&self.label) {
            if let Some(fault) = sink.take_fault() {
                return Err(fault);
            }
            client.tick(sink, PUMP_WAIT).map_err(protocol("evoke callbacks"))?;
        }
        client
            .sync_point_achieved(&self.label)
            .map_err(protocol("achieve sync point"))?;
        while !sink.is_synchronized(&self.label) {
            if let Some(fault) = sink.take_fault() {
                return Err(fault);
            }
            client.tick(sink, PUMP_WAIT).map_err(protocol("evoke callbacks"))?;
        }
        debug!(label = %self.label, "barrier crossed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::recording::RecordingClient;

    #[test]
    fn test_creator_crosses_solo_barrier() {
        let mut client = RecordingClient::new();
        let script = client.handle();
        let mut sink = CallbackSink::new();
        let barrier = Barrier::new("ready", true);
        barrier.cross(&mut client, &mut sink).unwrap();

        let script = script.lock().unwrap();
        let registered = script.position_of("register_sync_point").unwrap();
        let achieved = script.position_of("sync_point_achieved").unwrap();
        assert!(registered < achieved);
    }

    #[test]
    fn test_follower_waits_for_announcement() {
        let mut client = RecordingClient::new();
        let script = client.handle();
        // the announcement arrives from elsewhere before the first tick
        script.lock().unwrap().announce("ready");
        let mut sink = CallbackSink::new();
        let barrier = Barrier::new("ready", false);
        barrier.cross(&mut client, &mut sink).unwrap();

        let script = script.lock().unwrap();
        assert_eq!(script.position_of("register_sync_point"), None);
        assert!(script.position_of("sync_point_achieved").is_some());
    }

    #[test]
    fn test_failed_registration_is_an_error() {
        let mut client = RecordingClient::new();
        client.handle().lock().unwrap().fail_registration = true;
        let mut sink = CallbackSink::new();
        let barrier = Barrier::new("ready", true);
        let err = barrier.cross(&mut client, &mut sink).unwrap_err();
        assert!(matches!(err, FedError::BarrierRegistrationFailed { label } if label == "ready"));
    }
}
