//! Explicit, non-global stand-in for the original's process-wide
//! `TypeManager`/serializer singleton (design notes §9). Packing and
//! unpacking always goes through one `Registry` value created at process
//! startup and handed by reference to whatever needs it — never a
//! `static`/`lazy_static`.

use crate::application::Application;
use crate::error::EngineError;

/// Packs and unpacks application payloads and solutions. Constructed once
/// per process around a reference to the `Application` implementation and
/// threaded explicitly into the message fabric and the checkpoint
/// manager.
pub struct Registry<'a, A: Application> {
    app: &'a A,
}

impl<'a, A: Application> Registry<'a, A> {
    pub fn new(app: &'a A) -> Self {
        Registry { app }
    }

    pub fn encode_payload(&self, payload: &A::Payload) -> Vec<u8> {
        self.app.pack(payload)
    }

    pub fn decode_payload(&self, bytes: &[u8]) -> Result<A::Payload, EngineError> {
        self.app.unpack(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{BoundOutcome, Sense};
    use crate::ids::GlobalSubproblemId;
    use std::cmp::Ordering;

    struct ToyApp;
    impl Application for ToyApp {
        type Payload = i32;
        type Solution = i32;
        fn sense(&self) -> Sense {
            Sense::Min
        }
        fn root_subproblem(&self) -> i32 {
            0
        }
        fn bound(&self, payload: &mut i32, _q: &mut f64) -> BoundOutcome {
            BoundOutcome::Bounded(*payload as f64)
        }
        fn separate(&self, _p: &i32, _id: GlobalSubproblemId) -> Result<usize, EngineError> {
            Ok(1)
        }
        fn make_child(&self, payload: &i32, _which: usize) -> i32 {
            *payload
        }
        fn candidate_solution(&self, _payload: &i32) -> bool {
            true
        }
        fn extract_solution(&self, payload: &i32) -> i32 {
            *payload
        }
        fn compare_solution(&self, a: &i32, b: &i32) -> Ordering {
            a.cmp(b)
        }
        fn pack(&self, payload: &i32) -> Vec<u8> {
            payload.to_le_bytes().to_vec()
        }
        fn unpack(&self, bytes: &[u8]) -> Result<i32, EngineError> {
            Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
        }
    }

    #[test]
    fn round_trips_through_the_application() {
        let app = ToyApp;
        let registry = Registry::new(&app);
        let bytes = registry.encode_payload(&42);
        assert_eq!(registry.decode_payload(&bytes).unwrap(), 42);
    }
}
