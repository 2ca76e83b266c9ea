//! HTTP/JSON transport: the Requester/Responder split described in the
//! communication contract. Outbound calls go through [`Requester`]; inbound
//! calls are served by [`Responder`] and dispatched to registered
//! [`Callback`] implementations.

mod callback;
mod requester;
mod responder;

pub use callback::{Callback, CallbackResult};
pub use requester::{Requester, RpcOutcome};
pub use responder::Responder;
