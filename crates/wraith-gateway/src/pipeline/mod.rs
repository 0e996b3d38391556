//! Per-request pipeline of the protocol channel:
//! classify → resolve keys → dispatch → encode.

pub mod classifier;
pub mod dispatch;
pub mod keys;
pub mod response;

pub use classifier::{classify, requester_class, Classified};
pub use dispatch::{HandlerContext, HandlerFactory, ProtocolHandler, ProtocolRegistry, Responder};
pub use keys::{constant_time_compare, KeyResolver};
pub use response::ResponseEncoder;
