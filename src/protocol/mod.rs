//! Protocol Module
//!
//! Defines the binary wire protocol spoken to the cache servers.
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬────────────┬───────────┬──────────────────────┐
//! │ Type (4)  │ ReqId (4)  │ Size (4)  │       Payload        │
//! └───────────┴────────────┴───────────┴──────────────────────┘
//! ```
//! All integers are little-endian.
//!
//! ### Message Types
//! - 1 / 2:     SET request / response
//! - 3 / 4:     GET request / response
//! - 5 / 6:     DEL request / response
//! - 161 / 162: INCR request / response
//! - 163 / 164: GETMETA request / response
//!
//! ### Status Codes
//! Every response body starts with a `u16` code; 0 means success.

mod header;
mod value;
mod command;
mod response;
mod codec;
mod parser;

pub use header::{FrameHeader, MessageType, HEADER_SIZE};
pub use value::Value;
pub use command::Command;
pub use response::{Response, CODE_SUCCESS};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, MAX_KEY_SIZE,
    MAX_VALUE_SIZE,
};
pub use parser::{Reply, StreamParser};
