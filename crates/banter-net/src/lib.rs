// Transport layer: the persistent event stream between client and server.

pub mod channel;
pub mod error;
pub mod memory;
pub mod session;
pub mod websocket;

pub use channel::{Connector, EventChannel};
pub use error::NetError;
pub use session::{Session, SessionEvent};
pub use websocket::WsConnector;
