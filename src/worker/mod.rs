//! Consumer-side handlers run by the `notify-worker` binary.
//!
//! | Topic     | Handler                      |
//! |-----------|------------------------------|
//! | `email`   | [`RegistrationEmailHandler`] |
//! | `logs`    | [`LogStore`]                 |
//! | `message` | [`MessageForwarder`]         |

pub mod email;
pub mod log_store;
pub mod message;

pub use email::{EmailDispatcher, LoggingEmailDispatcher, OutgoingEmail, RegistrationEmail, RegistrationEmailHandler};
pub use log_store::{LogEntry, LogStore};
pub use message::MessageForwarder;
