//! Realtime voice channel: one live speech session per channel instance,
//! narration via `speak`, and voice events on the crate's event bus.

pub mod channel;
pub mod debounce;
pub mod loopback;
pub mod protocol;
pub mod retry;
pub mod signaling;
pub mod style;
pub mod transport;
pub mod websocket;

pub use channel::*;
pub use debounce::SpeakDebouncer;
pub use loopback::*;
pub use protocol::*;
pub use retry::*;
pub use signaling::*;
pub use style::*;
pub use transport::*;
pub use websocket::{WebSocketConnector, websocket_url};
