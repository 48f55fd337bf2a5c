//! JSON-RPC wire types.
//!
//! ## Protocol
//!
//! Callers send either a single request object or a batch (an array of
//! request objects):
//!
//! ```json
//! {"id":1,"method":"getjobstatus","params":[]}
//! ```
//!
//! Each request yields one reply; a batch yields the array of replies in the
//! same order:
//!
//! ```json
//! {"result":[],"error":null,"id":1}
//! ```

mod errors;
mod request;
mod response;

pub use self::errors::*;
pub use self::request::{JsonRequest, Params, request_id};
pub use self::response::JsonReply;
