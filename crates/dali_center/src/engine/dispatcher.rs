//! Named signal fan-out between components of the same process.
//!
//! A signal is identified by its name and carries a single payload type.
//! Senders never block: a signal with no connected receivers is simply
//! dropped, and slow receivers lag rather than holding up the sender.

use std::any::Any;
use std::any::type_name;
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::trace;
use tracing::warn;

/// Per-signal buffer before lagging receivers start missing payloads
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("signal {signal} carries {existing}, not {requested}")]
    TypeMismatch {
        signal: String,
        existing: &'static str,
        requested: &'static str,
    },
}

struct Channel {
    payload_type: &'static str,
    sender: Box<dyn Any + Send + Sync>,
}

/// Typed pub/sub keyed by signal name
#[derive(Default)]
pub struct Dispatcher {
    channels: Mutex<HashMap<String, Channel>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to a signal, creating it on first use.
    pub fn connect<T>(&self, signal: &str) -> Result<broadcast::Receiver<T>, DispatchError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let channel = channels.entry(signal.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel::<T>(SIGNAL_CHANNEL_CAPACITY);
            Channel {
                payload_type: type_name::<T>(),
                sender: Box::new(tx),
            }
        });

        let sender = channel
            .sender
            .downcast_ref::<broadcast::Sender<T>>()
            .ok_or_else(|| DispatchError::TypeMismatch {
                signal: signal.to_string(),
                existing: channel.payload_type,
                requested: type_name::<T>(),
            })?;

        trace!(signal, "connected to signal");
        Ok(sender.subscribe())
    }

    /// Send a payload to every receiver connected to `signal`.
    ///
    /// Returns the number of receivers the payload reached.
    pub fn send<T>(&self, signal: &str, payload: T) -> usize
    where
        T: Clone + Send + Sync + 'static,
    {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(channel) = channels.get(signal) else {
            trace!(signal, "no receivers for signal");
            return 0;
        };

        match channel.sender.downcast_ref::<broadcast::Sender<T>>() {
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => {
                warn!(
                    signal,
                    expected = channel.payload_type,
                    got = type_name::<T>(),
                    "dropping payload of the wrong type"
                );
                0
            }
        }
    }
}
