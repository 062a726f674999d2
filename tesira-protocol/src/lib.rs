//! Wire layer for the Tesira text protocol
//!
//! This crate knows how to talk Tesira text protocol (TTP) but nothing about
//! sessions, queues or timing. It provides:
//!
//! - **Command grammar** ([`command`]) - builds `"<tag>" <verb> <attribute> ...`
//!   lines from a fixed, table-driven formatting policy ([`attribute`])
//! - **Subscription tokens** ([`token`]) - deterministic custom names that route
//!   push lines back to the attribute that asked for them
//! - **Reply parsing** ([`reply`]) - `+OK` values, `-ERR` reasons and `!` push lines
//! - **Line classification** ([`line`]) - decides what an inbound line means
//! - **Framing** ([`framing`]) - turns a CR or CRLF terminated byte stream into lines
//!
//! # Example
//!
//! ```rust
//! use tesira_protocol::{attribute, command::{self, CommandTarget, Verb}};
//!
//! let target = CommandTarget::new("Level1", 1);
//! let line = command::build(Verb::Set, attribute::LEVEL, &target, Some("-12.5"));
//! assert_eq!(line, "\"Level1\" set level 1 -12.5");
//! ```

pub mod attribute;
pub mod command;
pub mod error;
pub mod framing;
pub mod line;
pub mod reply;
pub mod token;

pub use attribute::FormatRule;
pub use command::{CommandTarget, Verb};
pub use error::{ProtocolError, Result};
pub use framing::LineFramer;
pub use line::{ClassifierConfig, InboundLine, LineClassifier, DEFAULT_SESSION_BANNER};
pub use reply::PushMessage;
pub use token::SubscriptionToken;
