use crate::types::ThreadId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThreadError {
    #[error("thread table exhausted")]
    TableFull,

    #[error("failed to allocate a {size} byte stack")]
    StackAlloc { size: usize },

    #[error("no joinable thread {0}")]
    NotFound(ThreadId),

    #[error("mutex is not owned by the calling thread")]
    NotOwner,

    #[error("a thread cannot join itself")]
    Deadlock,

    #[error("thread {0} already has a joiner")]
    AlreadyJoined(ThreadId),

    #[error("initialization error: {0}")]
    Init(String),
}

impl ThreadError {
    /// The POSIX error code a pthreads-style shim reports for this error.
    pub fn errno(&self) -> i32 {
        match self {
            ThreadError::TableFull => libc::EAGAIN,
            ThreadError::StackAlloc { .. } => libc::ENOMEM,
            ThreadError::NotFound(_) => libc::ESRCH,
            ThreadError::NotOwner => libc::EPERM,
            ThreadError::Deadlock => libc::EDEADLK,
            ThreadError::AlreadyJoined(_) | ThreadError::Init(_) => libc::EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_posix_codes() {
        let id = ThreadId::new(4).unwrap();
        assert_eq!(ThreadError::TableFull.errno(), libc::EAGAIN);
        assert_eq!(ThreadError::StackAlloc { size: 16 }.errno(), libc::ENOMEM);
        assert_eq!(ThreadError::NotFound(id).errno(), libc::ESRCH);
        assert_eq!(ThreadError::NotOwner.errno(), libc::EPERM);
        assert_eq!(ThreadError::Deadlock.errno(), libc::EDEADLK);
        assert_eq!(ThreadError::AlreadyJoined(id).errno(), libc::EINVAL);
    }

    #[test]
    fn messages_name_the_thread() {
        assert_eq!(
            ThreadError::NotFound(ThreadId::new(2).unwrap()).to_string(),
            "no joinable thread #2"
        );
    }
}
