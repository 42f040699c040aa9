//! Async netlink library for Linux traffic-control action chains.
//!
//! Actions are the verdict half of traffic control: a filter matches a
//! packet and its action chain decides what happens to it (accept,
//! drop, mirror to another device, and so on). This crate builds and
//! parses the RTM_NEWACTION / RTM_DELACTION / RTM_GETACTION message
//! family and drives it over an async routing socket.
//!
//! The building blocks compose bottom-up:
//!
//! - [`attr`] / [`message`] / [`builder`] — the netlink wire codec.
//! - [`action`] — [`Action`] records in an ordered, reference-counted
//!   [`ActionChain`].
//! - [`codec`] — per-kind option codecs in an explicit
//!   [`CodecRegistry`]; `gact` and `mirred` ship built in, unknown
//!   kinds round-trip as opaque blobs.
//! - [`act`] — chain fill/parse and the request builders.
//! - [`connection`] — async [`Connection`] with add/change/delete and
//!   dump operations.
//!
//! ```ignore
//! use actlink::{CodecRegistry, Connection, ActionChain};
//! use actlink::codec::{gact_drop, mirred_mirror};
//! use std::sync::Arc;
//!
//! let registry = CodecRegistry::builtin();
//! let mut chain = ActionChain::new();
//! chain.append(Arc::new(gact_drop()?))?;
//!
//! let conn = Connection::new()?;
//! conn.add_actions(&chain, &registry, 0).await?;
//! ```

pub mod act;
pub mod action;
pub mod attr;
pub mod builder;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
pub mod socket;
pub mod stats;
pub mod types;

pub use act::{
    DeleteRequest, build_action_request, build_add_request, build_change_request,
    build_delete_request, build_dump_request, fill_actions, parse_action_message,
    parse_actions, parse_and_deliver, parse_delete_request,
};
pub use action::{Action, ActionChain, Link, LinkResolver};
pub use builder::MessageBuilder;
pub use codec::{ActionCodec, CodecRegistry, OptionsEncoding};
pub use connection::Connection;
pub use error::{Error, Result};
pub use socket::NetlinkSocket;
pub use stats::ActionStats;
