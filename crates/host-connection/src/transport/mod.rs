//! Transport abstraction.
//!
//! A transport only knows how to open a duplex message channel to a named
//! host. Retries, handshakes and request correlation live above it, so the
//! client can run over the real native messaging transport or an in-memory
//! fake.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hostlink_protocol::Message;

use crate::error::TransportError;

pub mod native;

/// An open duplex channel to a host.
///
/// The transport ends the `inbound` stream when the channel closes for any
/// reason, which is how the client learns of unsolicited disconnects.
/// Cancelling `closer` asks the transport to tear the channel down.
pub struct Channel {
    pub outbound: mpsc::Sender<Message>,
    pub inbound: mpsc::Receiver<Message>,
    pub closer: CancellationToken,
}

impl Channel {
    /// Asks the transport to close the channel.
    pub fn close(&self) {
        self.closer.cancel();
    }
}

/// Opens channels to hosts by name.
pub trait Transport: Send + Sync + 'static {
    fn open(
        &self,
        host_id: &str,
    ) -> impl Future<Output = Result<Channel, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn open(
        &self,
        host_id: &str,
    ) -> impl Future<Output = Result<Channel, TransportError>> + Send {
        (**self).open(host_id)
    }
}
