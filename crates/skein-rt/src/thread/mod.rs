pub mod scheduler;
pub mod table;
pub mod tcb;

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::error::ThreadError;
use crate::preempt::{self, PreemptionHook};
use crate::sync::critical::{self, CriticalSection, IrqLock};
use crate::types::{ThreadEntry, ThreadId};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use log::{debug, info, warn};
use scheduler::{RoundRobinScheduler, Scheduler, Tick};
use table::ThreadTable;
use tcb::{Stack, ThreadState};

pub struct ThreadManager {
    pub table: ThreadTable,
    pub current: ThreadId,
    pub scheduler: &'static dyn Scheduler,
    config: RuntimeConfig,
    hook: Option<PreemptionHook>,
    initialized: bool,
}

impl ThreadManager {
    const fn new() -> Self {
        Self {
            table: ThreadTable::new(),
            current: ThreadId::BOOTSTRAP,
            scheduler: &RoundRobinScheduler,
            config: RuntimeConfig::new(),
            hook: None,
            initialized: false,
        }
    }
}

pub(crate) static RUNTIME: IrqLock<ThreadManager> = IrqLock::new(ThreadManager::new());

/// `pthread_t` of the OS thread the runtime is bound to, 0 while unbound.
static OWNER: AtomicUsize = AtomicUsize::new(0);

/// Bumped by every `shutdown`. Thread ids recorded under an older
/// generation name threads that no longer exist.
static GENERATION: AtomicU64 = AtomicU64::new(0);

pub(crate) fn generation() -> u64 {
    GENERATION.load(Ordering::Acquire)
}

fn os_thread() -> usize {
    unsafe { libc::pthread_self() as usize }
}

pub(crate) fn on_owner_thread() -> bool {
    let owner = OWNER.load(Ordering::Acquire);
    owner != 0 && owner == os_thread()
}

pub(crate) fn check_owner() {
    let owner = OWNER.load(Ordering::Acquire);
    if owner != 0 && owner != os_thread() {
        panic!("skein runtime is bound to another OS thread");
    }
}

pub fn init(config: RuntimeConfig) -> Result<(), ThreadError> {
    config.validate().map_err(ThreadError::Init)?;
    check_owner();

    let mut rt = RUNTIME.lock();
    if rt.initialized {
        return Err(ThreadError::Init("runtime already initialized".into()));
    }

    let owner = os_thread();
    rt.hook = match config.timer_interval {
        Some(interval) => Some(PreemptionHook::install(interval, owner)?),
        None => None,
    };
    rt.config = config;
    rt.current = ThreadId::BOOTSTRAP;
    rt.initialized = true;
    scheduler::reset_stats();
    preempt::reset_stats();
    OWNER.store(owner, Ordering::Release);

    info!(
        "runtime initialized: stack={} bytes, timer={:?}",
        config.stack_size, config.timer_interval
    );
    Ok(())
}

fn ensure_initialized() -> Result<(), ThreadError> {
    if RUNTIME.lock().initialized {
        return Ok(());
    }
    init(RuntimeConfig::default())
}

pub fn shutdown() {
    check_owner();
    let _section = CriticalSection::enter();

    let hook = {
        let mut rt = RUNTIME.lock();
        if !rt.initialized {
            return;
        }
        if !rt.current.is_bootstrap() {
            drop(rt);
            panic!("shutdown must be called from the bootstrap thread");
        }
        rt.hook.take()
    };

    // No tick may observe a half-reset table.
    if let Some(hook) = hook {
        hook.uninstall();
    }

    let mut rt = RUNTIME.lock();
    let abandoned = rt.table.reset();
    if !abandoned.is_empty() {
        warn!("releasing {} abandoned thread stacks", abandoned.len());
    }
    drop(abandoned);
    GENERATION.fetch_add(1, Ordering::AcqRel);
    rt.current = ThreadId::BOOTSTRAP;
    rt.initialized = false;
    OWNER.store(0, Ordering::Release);
    info!("runtime shut down");
}

pub fn spawn(entry: ThreadEntry, arg: usize) -> Result<ThreadId, ThreadError> {
    check_owner();
    ensure_initialized()?;

    let mut rt = RUNTIME.lock();
    let id = rt.table.find_free().ok_or(ThreadError::TableFull)?;
    let mut stack = Stack::new(rt.config.stack_size)?;
    let context = unsafe { ExecutionContext::fabricate(stack.top(), thread_start) };

    let tcb = rt.table.get_mut(id);
    tcb.context = context;
    tcb.stack = Some(stack);
    tcb.entry = Some(entry);
    tcb.arg = arg;
    tcb.return_value = 0;
    tcb.join_waiter = None;
    tcb.state = ThreadState::Ready;

    debug!("spawned thread {}", id);
    Ok(id)
}

/// First code run on a fabricated context: calls the entry point, then
/// exits with its result.
extern "C" fn thread_start() -> ! {
    let (entry, arg) = {
        let rt = RUNTIME.lock();
        let tcb = rt.table.get(rt.current);
        (tcb.entry, tcb.arg)
    };
    // Reached from inside a scheduler tick, with the timer masked.
    critical::enable_interrupts();

    let Some(entry) = entry else {
        crate::fatal("thread started without an entry point");
    };
    exit(entry(arg))
}

pub fn exit(value: usize) -> ! {
    check_owner();

    let section = CriticalSection::enter();
    {
        let mut rt = RUNTIME.lock();
        let me = rt.current;
        if me.is_bootstrap() {
            warn!("bootstrap thread exiting; its slot is never reclaimed");
        }

        let tcb = rt.table.get_mut(me);
        tcb.return_value = value;
        tcb.state = ThreadState::Zombie;
        let waiter = tcb.join_waiter;

        if let Some(waiter) = waiter {
            if rt.table.state(waiter) == ThreadState::Blocked {
                rt.table.get_mut(waiter).state = ThreadState::Ready;
            }
        }
        debug!("thread {} exited with {:#x}", me, value);
    }

    loop {
        if scheduler::tick(&section) == Tick::Idle {
            crate::fatal("every thread has exited or is blocked");
        }
    }
}

pub fn join(id: ThreadId) -> Result<usize, ThreadError> {
    check_owner();

    {
        let mut rt = RUNTIME.lock();
        let me = rt.current;
        if id.is_bootstrap() || rt.table.state(id) == ThreadState::Free {
            return Err(ThreadError::NotFound(id));
        }
        if id == me {
            return Err(ThreadError::Deadlock);
        }
        let waiter = rt.table.get(id).join_waiter;
        if waiter.is_some_and(|waiter| waiter != me) {
            return Err(ThreadError::AlreadyJoined(id));
        }
        rt.table.get_mut(id).join_waiter = Some(me);
    }

    loop {
        let section = CriticalSection::enter();
        {
            let mut rt = RUNTIME.lock();
            let target = rt.table.get_mut(id);
            if target.state == ThreadState::Zombie {
                let value = target.return_value;
                // Released here, with interrupts still disabled.
                let stack = target.reclaim();
                drop(stack);
                debug!("joined thread {} with {:#x}", id, value);
                return Ok(value);
            }
        }
        park(&section);
    }
}

pub fn current() -> ThreadId {
    check_owner();
    RUNTIME.lock().current
}

pub fn yield_now() {
    check_owner();
    let section = CriticalSection::enter();
    scheduler::tick(&section);
}

/// Blocks the calling thread and runs someone else. Returns once another
/// thread has made the caller `Ready` and the scheduler picked it again.
pub(crate) fn park(section: &CriticalSection) {
    {
        let mut rt = RUNTIME.lock();
        let me = rt.current;
        rt.table.get_mut(me).state = ThreadState::Blocked;
    }
    if scheduler::tick(section) == Tick::Idle {
        crate::fatal("deadlock: every thread is blocked");
    }
}

/// Makes a `Blocked` thread runnable again; any other state is left alone.
pub(crate) fn wake(id: ThreadId) {
    let mut rt = RUNTIME.lock();
    let tcb = rt.table.get_mut(id);
    if tcb.state == ThreadState::Blocked {
        tcb.state = ThreadState::Ready;
    }
}

pub(crate) fn threads_in_use() -> usize {
    RUNTIME.lock().table.in_use()
}
