//! # iproto-client
//!
//! Asynchronous pipelined client for the IProto binary request/response
//! protocol.
//!
//! Every frame is a 12-byte header `{msg, len, sync}` followed by `len`
//! payload bytes. Header words are in host byte order; both peers must
//! agree on endianness out of band.
//!
//! ## Architecture
//!
//! - **Codec** ([`codec`]): typed packing and unpacking of payload fields
//! - **Connection** ([`connection`]): one TCP socket shared by many
//!   in-flight requests, correlated by sync id, with per-request deadlines,
//!   automatic reconnect and a liveness ping
//!
//! ## Example
//!
//! ```no_run
//! use iproto_client::codec::{pack, unpack};
//! use iproto_client::{Connection, RequestResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::builder("127.0.0.1:3301".parse()?).build();
//!
//!     conn.write(pack(100, 0, (42u32, "key")), |result| match result {
//!         RequestResult::Ok(mut packet) => {
//!             let decoded: Result<(u32,), _> = unpack(&mut packet);
//!             println!("response: {decoded:?}");
//!         }
//!         other => println!("request failed: {:?}", other.code()),
//!     });
//!
//!     while !conn.gentle_shutdown() {
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use codec::{pack, unpack, Packer};
pub use config::ConnectionConfig;
pub use connection::{
    Callback, ConnState, Connection, ConnectionBuilder, LogSink, RequestResult, ResultCode,
};
pub use error::{IprotoError, Result};
pub use protocol::{Header, Packet};
