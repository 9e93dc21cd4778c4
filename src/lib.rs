//! maskgate: a loopback gateway between AI agents and LLM providers.
//!
//! Outbound request text is scanned for secrets and personal data, which are
//! swapped for `__category_N__` placeholders before the request leaves the
//! machine. Provider responses, streamed or buffered, get the original values
//! put back before the caller sees them.

pub mod cli;
pub mod config;
pub mod error;
pub mod proxy;
pub mod restore;
pub mod sanitize;
pub mod server;
