//! Tether Common Types
//!
//! This crate provides the value types and capability traits shared by every
//! tether component:
//!
//! - **[`ServiceUrl`]**: immutable identity of one remote endpoint plus its
//!   parameter map, and the reference/provider merge rule
//! - **[`Invocation`]** / **[`RpcResult`]**: one logical call and its outcome
//! - **[`Invoker`]** / **[`Protocol`]**: the leaf capability performing a
//!   remote call, and the factory that creates invokers for discovered URLs
//! - **[`TetherError`]**: the error taxonomy used across the workspace
//!
//! # Example
//!
//! ```
//! use tether_common::{Invocation, ServiceUrl};
//! use serde_json::json;
//!
//! let url = ServiceUrl::parse("jsonrpc://127.0.0.1:20000/com.ikurento.UserProvider?group=gold")
//!     .unwrap();
//! assert_eq!(url.service_key(), "gold/com.ikurento.UserProvider");
//!
//! let invocation = Invocation::new("GetUser", vec![json!("A001")]);
//! assert_eq!(invocation.method_name(), "GetUser");
//! ```

pub mod constants;
pub mod invoker;
pub mod protocol;
pub mod url;
pub mod utils;

pub use invoker::{same_invoker, BaseInvoker, Invoker, Protocol};
pub use protocol::*;
pub use url::ServiceUrl;
