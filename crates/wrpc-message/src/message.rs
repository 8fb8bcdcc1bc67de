//! The request/response contract every protocol strategy implements, plus a
//! name-indexed registry so a channel can be told "speak redis" as a string
//! and get back the right pair of types without depending on the concrete
//! crate that provides them.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use wrpc_core::Result;

use crate::io::{Readable, Writable};

/// Something that can serialize itself onto a [`Writable`].
pub trait IRequest: Send {
    fn write_to(&mut self, writable: &mut dyn Writable, timeout_ms: i32) -> Result<()>;

    /// A coalescing key: requests with the same hash code are candidates for
    /// request merging upstream. Defaults to `0` (no coalescing); strategies
    /// that want it should hash their own content, since there's no portable
    /// analogue here of using the request object's own address as a default
    /// differentiator.
    fn hash_code(&self) -> u64 {
        0
    }
}

/// Something that can deserialize itself from a [`Readable`].
pub trait IResponse: Send {
    fn read_from(&mut self, readable: &mut dyn Readable, timeout_ms: i32) -> Result<()>;
}

/// A type that is both ends of one protocol round trip (nshead request and
/// response share a wire type; HTTP and redis do not).
pub trait IMessage: IRequest + IResponse {}

impl<T: IRequest + IResponse> IMessage for T {}

pub type RequestFactory = fn() -> Box<dyn IRequest>;
pub type ResponseFactory = fn() -> Box<dyn IResponse>;

#[derive(Default)]
struct Registry {
    requests: HashMap<&'static str, RequestFactory>,
    responses: HashMap<&'static str, ResponseFactory>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = Registry::default();
        r.requests.insert("http", || {
            Box::new(crate::http::HttpRequest::new(crate::http::HttpMethod::Get))
        });
        r.responses
            .insert("http", || Box::new(crate::http::HttpResponse::new()));
        r.requests
            .insert("redis", || Box::new(crate::redis::RedisRequest::new()));
        r.responses
            .insert("redis", || Box::new(crate::redis::RedisResponse::new()));
        r.requests
            .insert("nshead", || Box::new(crate::nshead::NsheadMessage::new()));
        r.responses
            .insert("nshead", || Box::new(crate::nshead::NsheadMessage::new()));
        RwLock::new(r)
    })
}

/// Registers a request strategy under `name`, returning `false` if the name
/// was already taken (the caller's registration did not replace anything).
pub fn register_request(name: &'static str, creator: RequestFactory) -> bool {
    registry()
        .write()
        .unwrap()
        .requests
        .insert(name, creator)
        .is_none()
}

/// Registers a response strategy under `name`. See [`register_request`].
pub fn register_response(name: &'static str, creator: ResponseFactory) -> bool {
    registry()
        .write()
        .unwrap()
        .responses
        .insert(name, creator)
        .is_none()
}

pub fn is_request_registered(name: &str) -> bool {
    registry().read().unwrap().requests.contains_key(name)
}

pub fn is_response_registered(name: &str) -> bool {
    registry().read().unwrap().responses.contains_key(name)
}

/// Builds a fresh request instance for a registered protocol name, or `None`
/// if nothing is registered under it.
pub fn new_request(name: &str) -> Option<Box<dyn IRequest>> {
    let creator = *registry().read().unwrap().requests.get(name)?;
    Some(creator())
}

/// Builds a fresh response instance for a registered protocol name, or `None`
/// if nothing is registered under it.
pub fn new_response(name: &str) -> Option<Box<dyn IResponse>> {
    let creator = *registry().read().unwrap().responses.get(name)?;
    Some(creator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_protocols_are_preregistered() {
        for name in ["http", "redis", "nshead"] {
            assert!(is_request_registered(name), "{name} request");
            assert!(is_response_registered(name), "{name} response");
            assert!(new_request(name).is_some());
            assert!(new_response(name).is_some());
        }
    }

    #[test]
    fn unknown_protocol_name_yields_none() {
        assert!(new_request("carrier-pigeon").is_none());
        assert!(new_response("carrier-pigeon").is_none());
    }

    #[test]
    fn registering_a_new_protocol_makes_it_constructible() {
        fn make_req() -> Box<dyn IRequest> {
            Box::new(crate::redis::RedisRequest::new())
        }
        assert!(register_request("custom-test-protocol", make_req));
        assert!(new_request("custom-test-protocol").is_some());
        // second registration under the same name does not replace silently unnoticed
        assert!(!register_request("custom-test-protocol", make_req));
    }
}
