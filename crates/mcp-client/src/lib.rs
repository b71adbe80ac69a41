//! Session state machine for MUD Client Protocol (MCP) 2.1.
//!
//! Builds on [`mcp_transport`]'s line-buffered transport and
//! [`mcp_wire`]'s tokenizer/composer to drive the handshake, package
//! negotiation, outbound calls, and inbound message reassembly described
//! by the protocol (§4.3).
//!
//! ```no_run
//! use mcp_client::{Session, PackageRequest};
//! use mcp_transport::TransportConfig;
//!
//! # async fn run() -> mcp_client::SessionResult<()> {
//! let config = TransportConfig::new("mud.example.org", 4201);
//! let mut session = Session::connect(&config).await?;
//! session.negotiate(vec![PackageRequest::Name("org-example".to_string())]).await?;
//! session.quit().await?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;
mod reassembly;
mod session;
mod version;

pub use catalog::{Catalog, CatalogEntry, NegotiatedSet};
pub use error::{SessionError, SessionResult};
pub use reassembly::InboundMessage;
pub use session::{PackageRequest, ProcessOutcome, Session};
pub use version::{ParseVersionError, Version, in_range};

pub use mcp_wire::Value;
