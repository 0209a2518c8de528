pub mod error;
pub mod invocation;
pub mod result;

pub use error::{Result, TerminationReason, TetherError};
pub use invocation::{Invocation, ReplyCallback, ReplySlot};
pub use result::{InvokeResult, RpcResult};
