//! Wire protocol message types and codec.
//!
//! Messages travel as binary WebSocket frames. Outbound frames carry a MIME
//! marker followed by the JSON request; inbound frames are JSON responses
//! whose `data` payload stays lazily encoded until the caller asks for
//! typed results.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`request`] | Request message, argument tokens, builders |
//! | [`response`] | Response parse, status codes, chunk accumulator |
//! | [`reader`] | Tagged-JSON (`@type`/`@value`) result decoding |

pub mod reader;
pub mod request;
pub mod response;

pub use reader::get_results;
pub use request::{Op, Processor, Request, RequestOptions};
pub use response::{read_response, status, Response, ResponseData};
