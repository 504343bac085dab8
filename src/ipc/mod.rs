//! Request/response channel between the unprivileged client and the root
//! daemon, carried over a polled mailbox.

pub mod client;
pub mod dispatcher;
pub mod mailbox;
pub mod protocol;

pub use client::{ErrorAdvice, ErrorAdvisor, RequestClient};
pub use dispatcher::{Dispatcher, Services};
pub use mailbox::{FsMailbox, Mailbox, Slot};
pub use protocol::{DaemonCommand, Request, RequestKind, Response};
