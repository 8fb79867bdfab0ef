//! Interface registry.
//!
//! Owns the per-interface state: the capture/transmit pair until a loop takes
//! it, the cancellation flag, the running flag and the learned whitelist.
//! Every lifecycle operation goes through one mutex, held only for the map
//! update itself and never while a capture loop runs, so deleting an
//! interface does not wait for its loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::{InjectionConfig, InjectionMode};
use crate::dns::{Classifier, DomainMatcher, IpMatcher, WhitelistCache};
use crate::error::{RegistryError, Result};
use crate::monitor::{Exemptions, LoopExit, run_capture_loop};
use crate::network::{FrameInjector, FrameSource, Injector, PacketCapture, SocketInjector};

struct InterfaceHandle<C, S> {
    /// Taken by the capture loop when it starts.
    io: Option<(C, S)>,
    cancelled: Arc<AtomicBool>,
    running: bool,
    whitelist: Arc<WhitelistCache>,
}

impl<C, S> InterfaceHandle<C, S> {
    fn new(capture: C, sender: S) -> Self {
        Self {
            io: Some((capture, sender)),
            cancelled: Arc::new(AtomicBool::new(false)),
            running: false,
            whitelist: Arc::new(WhitelistCache::new()),
        }
    }
}

type Handles<F> =
    HashMap<String, InterfaceHandle<<F as FrameSource>::Capture, <F as FrameSource>::Sender>>;

/// Registry of monitored interfaces.
pub struct Registry<F: FrameSource> {
    source: F,
    injection: InjectionConfig,
    runtime: Handle,
    handles: Mutex<Handles<F>>,
}

impl<F: FrameSource> Registry<F> {
    /// Create an empty registry.
    ///
    /// Forged replies are dispatched as tasks on `runtime`.
    pub fn new(source: F, injection: InjectionConfig, runtime: Handle) -> Self {
        Self {
            source,
            injection,
            runtime,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.handles.lock().contains_key(name)
    }

    /// Open the interface and register it.
    pub fn prepare(&self, name: &str) -> Result<()> {
        let mut handles = self.handles.lock();
        if handles.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()).into());
        }
        let (capture, sender) = self.source.open(name)?;
        handles.insert(name.to_string(), InterfaceHandle::new(capture, sender));
        info!(interface = name, "interface prepared");
        Ok(())
    }

    /// Names of all registered interfaces.
    pub fn list_handles(&self) -> Vec<String> {
        self.handles.lock().keys().cloned().collect()
    }

    /// Cancel the interface's loop, if any, and unregister it.
    pub fn delete_handles(&self, name: &str) -> Result<()> {
        let mut handles = self.handles.lock();
        let handle = handles
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        handle.cancelled.store(true, Ordering::SeqCst);
        info!(interface = name, "interface deleted");
        Ok(())
    }

    /// Delete every interface, ignoring individual failures.
    pub fn clear(&self) {
        info!("clearing all interfaces");
        for name in self.list_handles() {
            if let Err(err) = self.delete_handles(&name) {
                warn!(interface = %name, "delete failed during clear: {err}");
            }
        }
    }

    /// The learned whitelist of an interface.
    pub fn whitelist(&self, name: &str) -> Option<Arc<WhitelistCache>> {
        self.handles
            .lock()
            .get(name)
            .map(|handle| Arc::clone(&handle.whitelist))
    }

    /// Monitor an interface on the calling thread.
    ///
    /// Returns once the interface is deleted (at the next delivered frame)
    /// or its capture ends. A loop only runs once per prepared handle.
    pub fn run<M, D>(&self, name: &str, ip_exemptions: &M, domain_exemptions: &D) -> Result<()>
    where
        M: IpMatcher,
        D: DomainMatcher,
    {
        let (capture, sender, cancelled, whitelist) = {
            let mut handles = self.handles.lock();
            let handle = handles
                .get_mut(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            if handle.running {
                return Err(RegistryError::AlreadyRunning(name.to_string()).into());
            }
            let (capture, sender) = handle
                .io
                .take()
                .ok_or_else(|| RegistryError::AlreadyRunning(name.to_string()))?;
            handle.running = true;
            (
                capture,
                sender,
                Arc::clone(&handle.cancelled),
                Arc::clone(&handle.whitelist),
            )
        };

        info!(
            interface = name,
            mode = ?self.injection.mode,
            sentinel = %self.injection.sentinel,
            "capture loop running"
        );

        let exemptions = Exemptions {
            resolvers: ip_exemptions,
            domains: domain_exemptions,
        };
        let exit = match self.injection.mode {
            InjectionMode::Socket => {
                drop(sender);
                let injector = SocketInjector::new(self.runtime.clone(), self.injection.timeout());
                self.monitor(name, capture, &cancelled, whitelist, injector, exemptions)
            }
            InjectionMode::Link => {
                let injector = FrameInjector::new(self.runtime.clone(), sender);
                self.monitor(name, capture, &cancelled, whitelist, injector, exemptions)
            }
        };

        match exit {
            LoopExit::Cancelled => info!(interface = name, "capture loop stopped"),
            LoopExit::SourceEnded => warn!(
                interface = name,
                "capture channel closed; delete and prepare the interface to resume"
            ),
        }
        Ok(())
    }

    fn monitor<C, I, M, D>(
        &self,
        name: &str,
        capture: C,
        cancelled: &AtomicBool,
        whitelist: Arc<WhitelistCache>,
        injector: I,
        exemptions: Exemptions<'_, M, D>,
    ) -> LoopExit
    where
        C: PacketCapture,
        I: Injector,
        M: IpMatcher,
        D: DomainMatcher,
    {
        let classifier = Classifier::new(name, whitelist, injector, self.injection.sentinel);
        run_capture_loop(capture, cancelled, exemptions, &classifier)
    }
}
