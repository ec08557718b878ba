mod common;

use common::Session;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static FLAG: AtomicBool = AtomicBool::new(false);

fn spin_until_flag(_: usize) -> usize {
    let mut spins = 0usize;
    while !FLAG.load(Ordering::Acquire) {
        spins = spins.wrapping_add(1);
        std::hint::spin_loop();
    }
    spins
}

fn raise_flag(_: usize) -> usize {
    FLAG.store(true, Ordering::Release);
    0
}

#[test]
fn spinning_thread_cannot_starve_others() {
    let _rt = Session::preemptive();
    FLAG.store(false, Ordering::Release);

    let spinner = skein_rt::spawn(spin_until_flag, 0).unwrap();
    let raiser = skein_rt::spawn(raise_flag, 0).unwrap();

    // The spinner never yields; only the timer gets the raiser to run.
    assert!(skein_rt::join(spinner).is_ok());
    assert_eq!(skein_rt::join(raiser), Ok(0));

    let stats = skein_rt::stats();
    assert!(stats.preemptions > 0);
    assert!(stats.timer_ticks >= stats.preemptions);
    assert_eq!(stats.threads_in_use, 1);
}

static CHAINED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn count_alarm(_: libc::c_int) {
    CHAINED.fetch_add(1, Ordering::Relaxed);
}

fn wait_for_chained(target: usize) -> usize {
    while CHAINED.load(Ordering::Relaxed) < target {
        std::hint::spin_loop();
    }
    target
}

fn alarm_disposition() -> libc::sigaction {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        libc::sigaction(libc::SIGALRM, ptr::null(), &mut current);
        current
    }
}

fn set_alarm_disposition(
    handler: libc::sighandler_t,
    flags: libc::c_int,
    masked: &[libc::c_int],
) -> libc::sigaction {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = flags;
        libc::sigemptyset(&mut action.sa_mask);
        for &signal in masked {
            libc::sigaddset(&mut action.sa_mask, signal);
        }
        let mut previous: libc::sigaction = mem::zeroed();
        libc::sigaction(libc::SIGALRM, &action, &mut previous);
        previous
    }
}

fn masked_signals(action: &libc::sigaction) -> Vec<libc::c_int> {
    (1..32)
        .filter(|&signal| unsafe { libc::sigismember(&action.sa_mask, signal) } == 1)
        .collect()
}

#[test]
fn previous_handler_is_chained_and_restored() {
    let _rt = Session::uninitialised();
    CHAINED.store(0, Ordering::Relaxed);
    let original = set_alarm_disposition(
        count_alarm as usize,
        libc::SA_RESTART,
        &[libc::SIGUSR1, libc::SIGUSR2],
    );
    let installed = alarm_disposition();

    skein_rt::init(
        skein_rt::RuntimeConfig::new()
            .with_timer_interval(Some(std::time::Duration::from_millis(1))),
    )
    .unwrap();
    let id = skein_rt::spawn(wait_for_chained, 5).unwrap();
    assert_eq!(skein_rt::join(id), Ok(5));
    skein_rt::shutdown();

    let restored = alarm_disposition();
    assert_eq!(restored.sa_sigaction, count_alarm as usize);
    assert_eq!(restored.sa_flags, installed.sa_flags);
    assert_ne!(restored.sa_flags & libc::SA_RESTART, 0);
    assert_eq!(masked_signals(&restored), masked_signals(&installed));
    assert_eq!(masked_signals(&restored), vec![libc::SIGUSR1, libc::SIGUSR2]);

    unsafe { libc::sigaction(libc::SIGALRM, &original, ptr::null_mut()) };
}

#[test]
fn cooperative_mode_leaves_the_timer_vector_alone() {
    let _rt = Session::uninitialised();
    let before = alarm_disposition().sa_sigaction;

    skein_rt::init(skein_rt::RuntimeConfig::cooperative()).unwrap();
    assert_eq!(alarm_disposition().sa_sigaction, before);
    let id = skein_rt::spawn(|n| n, 0).unwrap();
    skein_rt::join(id).unwrap();
    assert_eq!(skein_rt::stats().timer_ticks, 0);

    skein_rt::shutdown();
    assert_eq!(alarm_disposition().sa_sigaction, before);
}

#[test]
fn bootstrap_thread_is_preempted_too() {
    let _rt = Session::preemptive();
    FLAG.store(false, Ordering::Release);

    let spinner = skein_rt::spawn(spin_until_flag, 0).unwrap();
    while skein_rt::stats().preemptions < 3 {
        std::hint::spin_loop();
    }
    assert!(skein_rt::sync::interrupts_enabled());
    FLAG.store(true, Ordering::Release);
    assert!(skein_rt::join(spinner).is_ok());
}
