//! Synchronous request/response over bounded channels.
//!
//! Each service owns the receiving end of a bounded request queue and drains
//! it between control cycles. Every request carries its own single-slot
//! response sender, so a caller sees exactly one reply per call and never
//! shares mutable state with the service task.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::debug;

use crate::error::{RTError, RTResult};

/// Capacity of a service request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 16;

/// How long a client waits for a service to accept and answer a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Create the request queue of a service.
#[must_use]
pub fn request_channel<R>() -> (Sender<R>, Receiver<R>) {
    channel::bounded(REQUEST_QUEUE_CAPACITY)
}

/// Send a reply, ignoring a requester that already gave up waiting.
pub fn respond<T>(response: &Sender<T>, value: T) {
    if response.try_send(value).is_err() {
        debug!("Requester dropped before the reply was sent");
    }
}

/// Client side of a service request queue.
#[derive(Debug)]
pub struct ServiceClient<R> {
    requests: Sender<R>,
    timeout: Duration,
}

impl<R> Clone for ServiceClient<R> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            timeout: self.timeout,
        }
    }
}

impl<R> ServiceClient<R> {
    /// Wrap the sending end of a request queue.
    #[must_use]
    pub fn new(requests: Sender<R>) -> Self {
        Self {
            requests,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send the request built by `make` and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::ServiceTimeout`] if the queue stays full or the
    /// reply does not arrive within the timeout, and
    /// [`RTError::ChannelClosed`] if the service has stopped.
    pub fn call<T>(&self, make: impl FnOnce(Sender<T>) -> R) -> RTResult<T> {
        let (response, reply) = channel::bounded(1);
        self.requests
            .send_timeout(make(response), self.timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => RTError::ServiceTimeout,
                SendTimeoutError::Disconnected(_) => RTError::ChannelClosed,
            })?;
        reply.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => RTError::ServiceTimeout,
            RecvTimeoutError::Disconnected => RTError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    enum Request {
        Double { value: u32, response: Sender<u32> },
    }

    #[test]
    fn test_call_roundtrip() -> RTResult<()> {
        let (tx, rx) = request_channel::<Request>();
        let server = thread::spawn(move || {
            while let Ok(Request::Double { value, response }) = rx.recv() {
                respond(&response, value * 2);
            }
        });

        let client = ServiceClient::new(tx);
        assert_eq!(client.call(|response| Request::Double { value: 21, response })?, 42);
        drop(client);
        assert!(server.join().is_ok());
        Ok(())
    }

    #[test]
    fn test_unanswered_call_times_out() {
        let (tx, _rx) = request_channel::<Request>();
        let client = ServiceClient::new(tx).with_timeout(Duration::from_millis(5));
        let result = client.call(|response| Request::Double { value: 1, response });
        assert_eq!(result, Err(RTError::ServiceTimeout));
    }

    #[test]
    fn test_stopped_service_reports_closed_channel() {
        let (tx, rx) = request_channel::<Request>();
        drop(rx);
        let client = ServiceClient::new(tx);
        let result = client.call(|response| Request::Double { value: 1, response });
        assert_eq!(result, Err(RTError::ChannelClosed));
    }

    #[test]
    fn test_dropped_request_reports_closed_channel() {
        let (tx, rx) = request_channel::<Request>();
        // Receive and drop without answering.
        let server = thread::spawn(move || rx.recv().is_ok());
        let client = ServiceClient::new(tx);
        let result = client.call(|response| Request::Double { value: 1, response });
        assert_eq!(result, Err(RTError::ChannelClosed));
        assert!(matches!(server.join(), Ok(true)));
    }
}
