//! Outstanding request registry

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::types::CorrelationId;

/// What triggered a coaching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
    /// Periodic tick with an empty utterance
    Proactive,
    /// User utterance (question for the coach)
    Utterance,
}

/// Requests sent and not yet answered.
#[derive(Debug, Default)]
pub struct OutstandingRequests {
    pending: Mutex<HashMap<CorrelationId, RequestOrigin>>,
}

impl OutstandingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request before it is sent.
    pub fn register(&self, id: CorrelationId, origin: RequestOrigin) {
        self.lock().insert(id, origin);
    }

    /// Settle the request `sent` given the id the backend echoed.
    ///
    /// `sent` is removed either way. Returns its origin only when the echo
    /// matches and the request was still outstanding; anything else is stale.
    pub fn resolve(&self, sent: CorrelationId, echoed: Option<CorrelationId>) -> Option<RequestOrigin> {
        let origin = self.lock().remove(&sent)?;
        (echoed == Some(sent)).then_some(origin)
    }

    /// Drop a request whose call failed.
    pub fn forget(&self, id: CorrelationId) {
        self.lock().remove(&id);
    }

    /// Forget everything; responses still in flight become stale.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationId, RequestOrigin>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_echo_resolves_once() {
        let reqs = OutstandingRequests::new();
        let id = CorrelationId::new();
        reqs.register(id, RequestOrigin::Utterance);

        assert_eq!(reqs.resolve(id, Some(id)), Some(RequestOrigin::Utterance));
        assert_eq!(reqs.resolve(id, Some(id)), None, "second resolve is stale");
        assert!(reqs.is_empty());
    }

    #[test]
    fn mismatched_echo_is_stale_and_consumes_request() {
        let reqs = OutstandingRequests::new();
        let id = CorrelationId::new();
        reqs.register(id, RequestOrigin::Proactive);

        assert_eq!(reqs.resolve(id, Some(CorrelationId::new())), None);
        assert_eq!(reqs.resolve(id, Some(id)), None);
        assert!(reqs.is_empty());
    }

    #[test]
    fn unparseable_echo_is_stale() {
        let reqs = OutstandingRequests::new();
        let id = CorrelationId::new();
        reqs.register(id, RequestOrigin::Proactive);
        assert_eq!(reqs.resolve(id, None), None);
    }

    #[test]
    fn cleared_requests_are_stale() {
        let reqs = OutstandingRequests::new();
        let id = CorrelationId::new();
        reqs.register(id, RequestOrigin::Proactive);
        reqs.clear();
        assert_eq!(reqs.resolve(id, Some(id)), None);
    }
}
