// Invocation dispatcher (C7): correlates outbound RPC requests with
// responses by transaction id, and resolves the inbound side of the same
// protocol. SPEC_FULL.md §4.7.
//
// Suspension here is modeled the same way §9 describes: a call that awaits
// a reply returns a future (a `tokio::sync::oneshot::Receiver`), and
// canceling the session resolves every outstanding one exactly once
// (invariant 6, §8) rather than leaving it to drop silently.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::amf::AMF0Value;
use crate::constants::NO_RESPONSE_TRANSACTION_ID;
use crate::error::CallFailed;

/// The future side of an outbound `call()`: resolves once the peer replies
/// `_result` (`Ok`) or `_error` (`Err`), or the connection is lost.
pub type CallResult = Result<AMF0Value, CallFailed>;

/// Allocates transaction ids and tracks calls awaiting a reply.
pub struct InvokeDispatcher {
    next_transaction_id: u32,
    pending: HashMap<u32, oneshot::Sender<CallResult>>,
    max_pending: usize,
}

impl InvokeDispatcher {
    pub fn new(max_pending: usize) -> Self {
        InvokeDispatcher {
            next_transaction_id: NO_RESPONSE_TRANSACTION_ID,
            pending: HashMap::new(),
            max_pending,
        }
    }

    /// Allocates a transaction id (skipping 0) and registers a pending
    /// call, returning the id to send on the wire and a receiver the caller
    /// awaits for the reply.
    pub fn begin_call(&mut self) -> Result<(u32, oneshot::Receiver<CallResult>), CallFailed> {
        if self.pending.len() >= self.max_pending {
            return Err(CallFailed::TooManyPendingCalls);
        }

        let id = loop {
            self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
            if self.next_transaction_id == NO_RESPONSE_TRANSACTION_ID {
                continue;
            }
            if !self.pending.contains_key(&self.next_transaction_id) {
                break self.next_transaction_id;
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        Ok((id, rx))
    }

    /// Handles an inbound `Invoke` that might be a reply to one of our own
    /// calls. Returns `true` if `name`/`id` matched (and consumed) a
    /// pending call; `false` means the caller should fall through to
    /// method-table dispatch instead.
    pub fn handle_reply(&mut self, name: &str, id: f64, argv: &[AMF0Value]) -> bool {
        if name != "_result" && name != "_error" {
            return false;
        }

        let transaction_id = id as u32;
        let Some(tx) = self.pending.remove(&transaction_id) else {
            return false;
        };

        let result = if name == "_result" {
            Ok(argv.get(1).cloned().unwrap_or(AMF0Value::Null))
        } else {
            let info = argv.get(1);
            Err(CallFailed::Rejected {
                code: info
                    .and_then(|v| v.get_object_property("code"))
                    .map(|v| v.get_string().to_string()),
                description: info
                    .and_then(|v| v.get_object_property("description"))
                    .map(|v| v.get_string().to_string()),
                level: info
                    .and_then(|v| v.get_object_property("level"))
                    .map(|v| v.get_string().to_string()),
            })
        };

        // The caller may have dropped its receiver (gave up on the call);
        // that's fine, the reply is simply discarded.
        let _ = tx.send(result);
        true
    }

    /// Rejects every outstanding call with `ConnectionLost`, exactly once
    /// each (invariant 6, §8). Called on session teardown.
    pub fn cancel_all(&mut self) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(CallFailed::ConnectionLost));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for InvokeDispatcher {
    fn default() -> Self {
        InvokeDispatcher::new(usize::MAX)
    }
}

/// Builds the AMF argument vector for a `_result` reply to a successful
/// inbound call: `[null, returnValue]` (SPEC_FULL.md §4.7).
pub fn result_argv(return_value: AMF0Value) -> Vec<AMF0Value> {
    vec![AMF0Value::Null, return_value]
}

/// Builds the AMF info object for an `_error` reply.
pub fn error_info_object(code: &str, description: &str, level: &str) -> AMF0Value {
    let mut properties = std::collections::HashMap::new();
    properties.insert("code".to_string(), AMF0Value::String { value: code.to_string() });
    properties.insert(
        "description".to_string(),
        AMF0Value::String {
            value: description.to_string(),
        },
    );
    properties.insert(
        "level".to_string(),
        AMF0Value::String {
            value: level.to_string(),
        },
    );
    AMF0Value::Object { properties }
}

/// `_error` argv for an unrecognized method name, per SPEC_FULL.md §4.7.
pub fn method_not_found_argv(name: &str) -> Vec<AMF0Value> {
    vec![
        AMF0Value::Null,
        error_info_object(
            "NetConnection.Call.Failed",
            &format!("Method not found ({name})"),
            "error",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_resolves_on_matching_result() {
        let mut dispatcher = InvokeDispatcher::new(10);
        let (id, rx) = dispatcher.begin_call().unwrap();
        assert_ne!(id, 0);

        let argv = vec![AMF0Value::Null, AMF0Value::String { value: "ok".to_string() }];
        assert!(dispatcher.handle_reply("_result", id as f64, &argv));

        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), AMF0Value::String { value: "ok".to_string() });
    }

    #[tokio::test]
    async fn call_rejects_on_matching_error_with_info_object() {
        let mut dispatcher = InvokeDispatcher::new(10);
        let (id, rx) = dispatcher.begin_call().unwrap();

        let argv = vec![
            AMF0Value::Null,
            error_info_object("NetConnection.Call.Failed", "nope", "error"),
        ];
        assert!(dispatcher.handle_reply("_error", id as f64, &argv));

        let err = rx.await.unwrap().unwrap_err();
        match err {
            CallFailed::Rejected { description, .. } => {
                assert_eq!(description.as_deref(), Some("nope"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_reply_falls_through() {
        let mut dispatcher = InvokeDispatcher::new(10);
        assert!(!dispatcher.handle_reply("_result", 999.0, &[]));
    }

    #[tokio::test]
    async fn cancel_all_rejects_every_pending_call_exactly_once() {
        let mut dispatcher = InvokeDispatcher::new(10);
        let (_id1, rx1) = dispatcher.begin_call().unwrap();
        let (_id2, rx2) = dispatcher.begin_call().unwrap();
        assert_eq!(dispatcher.pending_count(), 2);

        dispatcher.cancel_all();

        assert!(matches!(rx1.await.unwrap(), Err(CallFailed::ConnectionLost)));
        assert!(matches!(rx2.await.unwrap(), Err(CallFailed::ConnectionLost)));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn too_many_pending_calls_rejected() {
        let mut dispatcher = InvokeDispatcher::new(1);
        let _ = dispatcher.begin_call().unwrap();
        assert!(matches!(
            dispatcher.begin_call(),
            Err(CallFailed::TooManyPendingCalls)
        ));
    }

    #[test]
    fn transaction_ids_never_reuse_zero() {
        let mut dispatcher = InvokeDispatcher::new(10);
        for _ in 0..5 {
            let (id, _rx) = dispatcher.begin_call().unwrap();
            assert_ne!(id, NO_RESPONSE_TRANSACTION_ID);
        }
    }
}
