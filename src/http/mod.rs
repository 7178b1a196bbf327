//! HTTP/1.1 types, codec, and URI (`spec.md` §4.5/§4.6, §6).

mod codec;
mod message;
mod uri;

pub use codec::{read_request, write_body_fixed, write_chunk, write_chunked_end, write_response_head, BodyFraming};
pub use message::{reason_phrase, HTTPRequest, HTTPResponse, Headers, HttpVersion};
pub use uri::{url_decode, url_encode, URI};
