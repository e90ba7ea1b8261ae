//! Exclusive access to the capture device.
//!
//! Only one screen may hold the camera at a time. Access goes through a
//! [`CameraLease`]; dropping or releasing the lease closes the device so the
//! hardware handle and the OS recording indicator never outlive the screen.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::analysis::CapturedFrame;

pub trait CameraDevice: Send {
    fn open(&mut self) -> Result<()>;
    fn capture_frame(&mut self) -> Result<CapturedFrame>;
    fn close(&mut self);
}

struct CameraSlot {
    device: Box<dyn CameraDevice>,
    owner: Option<String>,
}

#[derive(Clone)]
pub struct CameraHub {
    slot: Arc<Mutex<CameraSlot>>,
}

fn lock(slot: &Mutex<CameraSlot>) -> MutexGuard<'_, CameraSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl CameraHub {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(CameraSlot {
                device,
                owner: None,
            })),
        }
    }

    pub fn owner(&self) -> Option<String> {
        lock(&self.slot).owner.clone()
    }

    pub fn is_in_use(&self) -> bool {
        lock(&self.slot).owner.is_some()
    }

    /// Open the device for `owner`. Fails if another owner holds it.
    pub fn acquire(&self, owner: &str) -> Result<CameraLease> {
        let mut slot = lock(&self.slot);
        if let Some(current) = &slot.owner {
            bail!("camera already held by {current}");
        }
        slot.device
            .open()
            .with_context(|| format!("failed to open camera for {owner}"))?;
        slot.owner = Some(owner.to_string());
        info!("Camera acquired by {owner}");

        Ok(CameraLease {
            hub: self.clone(),
            owner: owner.to_string(),
            released: false,
        })
    }
}

pub struct CameraLease {
    hub: CameraHub,
    owner: String,
    released: bool,
}

impl std::fmt::Debug for CameraLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraLease")
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}

impl CameraLease {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn capture(&mut self) -> Result<CapturedFrame> {
        if self.released {
            bail!("camera lease for {} already released", self.owner);
        }
        lock(&self.hub.slot).device.capture_frame()
    }

    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut slot = lock(&self.hub.slot);
        if slot.owner.as_deref() == Some(self.owner.as_str()) {
            slot.device.close();
            slot.owner = None;
            info!("Camera released by {}", self.owner);
        } else {
            warn!("Camera lease for {} no longer owns the device", self.owner);
        }
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeCamera(Arc<Counters>);

    impl CameraDevice for FakeCamera {
        fn open(&mut self) -> Result<()> {
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn capture_frame(&mut self) -> Result<CapturedFrame> {
            Ok(CapturedFrame {
                width: 2,
                height: 2,
                jpeg: vec![1, 2, 3],
                captured_at: Utc::now(),
            })
        }

        fn close(&mut self) {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn hub() -> (CameraHub, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (CameraHub::new(Box::new(FakeCamera(counters.clone()))), counters)
    }

    #[test]
    fn lease_is_exclusive() {
        let (hub, _) = hub();
        let lease = hub.acquire("camera-screen").unwrap();
        assert!(hub.acquire("share-screen").is_err());
        lease.release();
        assert!(hub.acquire("share-screen").is_ok());
    }

    #[test]
    fn drop_closes_device() {
        let (hub, counters) = hub();
        {
            let mut lease = hub.acquire("camera-screen").unwrap();
            lease.capture().unwrap();
            assert_eq!(hub.owner().as_deref(), Some("camera-screen"));
        }
        assert!(!hub.is_in_use());
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_then_drop_closes_once() {
        let (hub, counters) = hub();
        let lease = hub.acquire("camera-screen").unwrap();
        lease.release();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }
}
