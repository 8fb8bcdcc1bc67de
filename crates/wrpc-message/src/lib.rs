//! Message framing: the `Readable`/`Writable` transport seam, the
//! `IRequest`/`IResponse`/`IMessage` contract built on top of it, and three
//! pluggable protocol strategies (HTTP/1.x, redis RESP, nshead) registered
//! into a name-indexed factory so a channel can be told "speak redis" by
//! string and get the right types back.

pub mod http;
pub mod io;
pub mod message;
pub mod nshead;
pub mod redis;

pub use io::{Readable, Writable};
pub use message::{
    is_request_registered, is_response_registered, new_request, new_response, register_request,
    register_response, IMessage, IRequest, IResponse, RequestFactory, ResponseFactory,
};
