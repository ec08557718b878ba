pub mod critical;
pub mod mutex;

pub use critical::{interrupts_enabled, CriticalSection};
pub use mutex::Mutex;
