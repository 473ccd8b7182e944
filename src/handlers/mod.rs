// Reexport handlers
pub mod hybrid;
pub mod long_poll;
pub mod ops;
pub mod short_poll;
pub mod sse;
pub mod websocket;

pub use long_poll::long_poll;
pub use ops::{healthz, stats};
pub use short_poll::short_poll;
pub use sse::sse_stream;
pub use websocket::ws_connect;
