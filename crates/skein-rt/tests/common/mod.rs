#![allow(dead_code)]

use skein_rt::RuntimeConfig;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// The runtime is process-wide state; tests that drive it take turns.
static SERIAL: Mutex<()> = Mutex::new(());

/// An initialised runtime bound to the calling test thread, shut down on
/// drop.
pub struct Session {
    _serial: MutexGuard<'static, ()>,
}

impl Session {
    /// Takes the runtime without initialising it; the first spawn does.
    pub fn uninitialised() -> Self {
        let serial = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = env_logger::builder().is_test(true).try_init();
        Self { _serial: serial }
    }

    pub fn start(config: RuntimeConfig) -> Self {
        let session = Self::uninitialised();
        skein_rt::init(config).expect("runtime init");
        session
    }

    /// No timer: threads only switch at yields and blocking calls.
    pub fn cooperative() -> Self {
        Self::start(RuntimeConfig::cooperative())
    }

    pub fn preemptive() -> Self {
        Self::start(RuntimeConfig::new().with_timer_interval(Some(Duration::from_millis(1))))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        skein_rt::shutdown();
    }
}
