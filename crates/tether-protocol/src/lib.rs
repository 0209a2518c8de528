//! Tether JSON-RPC Protocol
//!
//! A concrete [`Protocol`](tether_common::Protocol) that calls providers with
//! JSON-RPC 2.0 over HTTP/1.1. Requests are posted to
//! `http://<ip>:<port>/<service>` with the invocation arguments as the
//! positional `params` array.
//!
//! # Example
//!
//! ```no_run
//! use tether_common::{Invocation, Protocol, ReplySlot, ServiceUrl};
//! use tether_protocol::JsonRpcProtocol;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> tether_common::Result<()> {
//! let protocol = JsonRpcProtocol::new();
//! let invoker = protocol.refer(ServiceUrl::parse(
//!     "jsonrpc://127.0.0.1:20000/com.ikurento.UserProvider?timeout=500",
//! )?)?;
//!
//! let reply = ReplySlot::new();
//! let invocation = Invocation::new("GetUser", vec![json!("A001")]).with_reply(reply.clone());
//! invoker.invoke(&invocation).await?;
//! println!("{:?}", reply.get());
//! # Ok(())
//! # }
//! ```

mod client;
mod invoker;
pub mod jsonrpc;
mod protocol;

pub use client::HttpClient;
pub use invoker::JsonRpcInvoker;
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use protocol::JsonRpcProtocol;
