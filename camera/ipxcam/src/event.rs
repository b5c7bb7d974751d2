//! Device events and parameter update notification.
//!
//! Observers are invoked synchronously on whichever thread caused the update.
//! From the point of view of the observer this is an unspecified internal
//! thread, so observers must return quickly and must not block.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use tracing::trace;

use ipxcam_types::EventKind;

use crate::param::Param;
use crate::{Error, Result};

/// Handle returned on subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// An asynchronous notification from a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub kind: EventKind,
    /// Device specific event id (only meaningful for GenICam events).
    pub event_id: u16,
    /// Device timestamp in ticks.
    pub timestamp: u64,
    pub data: Vec<u8>,
}

pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &DeviceEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&DeviceEvent) + Send + Sync,
{
    fn on_event(&self, event: &DeviceEvent) {
        self(event)
    }
}

pub trait ParamObserver: Send + Sync {
    fn on_param_update(&self, param: &Param);
}

impl<F> ParamObserver for F
where
    F: Fn(&Param) + Send + Sync,
{
    fn on_param_update(&self, param: &Param) {
        self(param)
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    events: Vec<(SubscriptionId, Arc<dyn EventObserver>)>,
    params: Vec<(SubscriptionId, String, Arc<dyn ParamObserver>)>,
}

impl Observers {
    fn next(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Explicit subscribe/unsubscribe registry for event and parameter observers.
#[derive(Default)]
pub struct ObserverRegistry {
    inner: Mutex<Observers>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_events(&self, observer: Arc<dyn EventObserver>) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = inner.next();
        inner.events.push((id, observer));
        id
    }

    pub fn subscribe_param(&self, name: &str, observer: Arc<dyn ParamObserver>) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = inner.next();
        inner.params.push((id, name.to_string(), observer));
        id
    }

    /// Remove a subscription. Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let n = inner.events.len() + inner.params.len();
        inner.events.retain(|(i, _)| *i != id);
        inner.params.retain(|(i, _, _)| *i != id);
        n != inner.events.len() + inner.params.len()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.events.len() + inner.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_event(&self, event: &DeviceEvent) {
        // Observers run without the lock held so they may unsubscribe.
        let observers: Vec<_> = {
            let inner = self.inner.lock();
            inner.events.iter().map(|(_, o)| o.clone()).collect()
        };
        trace!("notifying {} observers of {:?}", observers.len(), event.kind);
        for observer in observers {
            observer.on_event(event);
        }
    }

    pub fn notify_param(&self, param: &Param) {
        let observers: Vec<_> = {
            let inner = self.inner.lock();
            inner
                .params
                .iter()
                .filter(|(_, name, _)| name == &param.name)
                .map(|(_, _, o)| o.clone())
                .collect()
        };
        for observer in observers {
            observer.on_param_update(param);
        }
    }
}

/// A GigE Vision event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GevEvent {
    pub event_id: u16,
    pub timestamp: u64,
}

impl GevEvent {
    pub const MAGIC: u8 = 0x42;
    pub const MIN_LEN: usize = 24;

    /// Parse the header of an event packet.
    ///
    /// The event id is big-endian at bytes 10..12 and the timestamp is
    /// big-endian at bytes 16..24.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(Error::InvalidArgument(format!(
                "event packet too short ({} bytes)",
                data.len()
            )));
        }
        if data[0] != Self::MAGIC {
            return Err(Error::InvalidArgument(format!(
                "bad event packet magic 0x{:02X}",
                data[0]
            )));
        }
        Ok(Self {
            event_id: BigEndian::read_u16(&data[10..12]),
            timestamp: BigEndian::read_u64(&data[16..24]),
        })
    }

    /// Build a packet with this header followed by `payload`.
    pub fn to_packet(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; Self::MIN_LEN];
        buf[0] = Self::MAGIC;
        BigEndian::write_u16(&mut buf[10..12], self.event_id);
        BigEndian::write_u64(&mut buf[16..24], self.timestamp);
        buf.extend_from_slice(payload);
        buf
    }
}

impl TryFrom<&DeviceEvent> for GevEvent {
    type Error = Error;
    fn try_from(event: &DeviceEvent) -> Result<Self> {
        GevEvent::parse(&event.data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::param::ParamKind;

    #[test]
    fn test_gev_parse() {
        let mut data = vec![0u8; 32];
        data[0] = 0x42;
        data[10] = 0x90;
        data[11] = 0x01;
        data[16..24].copy_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        let ev = GevEvent::parse(&data).unwrap();
        assert_eq!(ev.event_id, 0x9001);
        assert_eq!(ev.timestamp, 0x0102_0304_0506_0708);
        assert_eq!(GevEvent::parse(&ev.to_packet(&[1, 2, 3])).unwrap(), ev);

        data[0] = 0x41;
        assert!(GevEvent::parse(&data).is_err());
        assert!(GevEvent::parse(&[0x42; 12]).is_err());
    }

    #[test]
    fn test_observers() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        let id = registry.subscribe_events(Arc::new(move |_ev: &DeviceEvent| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));
        let c3 = count.clone();
        let pid = registry.subscribe_param(
            "ExposureTime",
            Arc::new(move |p: &Param| {
                assert_eq!(p.name, "ExposureTime");
                c3.fetch_add(10, Ordering::SeqCst);
            }),
        );
        let ev = DeviceEvent {
            kind: EventKind::CameraConnected,
            event_id: 0,
            timestamp: 0,
            data: vec![],
        };
        registry.notify_event(&ev);
        registry.notify_param(&Param::new("Width", ParamKind::Boolean { value: true }));
        registry.notify_param(&Param::new(
            "ExposureTime",
            ParamKind::Boolean { value: true },
        ));
        assert_eq!(count.load(Ordering::SeqCst), 11);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify_event(&ev);
        assert_eq!(count.load(Ordering::SeqCst), 11);
        assert!(registry.unsubscribe(pid));
        assert!(registry.is_empty());
    }
}
