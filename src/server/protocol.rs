use serde::{Deserialize, Serialize};

use crate::launch::WindowSpec;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Discovery handshake: who is behind this socket?
    Identify,
    /// The one launch operation. The caller states its identity; the server
    /// validates it against its own before realizing anything.
    Launch {
        uid: u32,
        display: String,
        windows: Vec<WindowSpec>,
    },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Identity { uid: u32, display: String },
    /// The launch was validated and window construction initiated. It may
    /// still complete asynchronously after this reply.
    Ack,
    Reject(Reject),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reject {
    UserMismatch { server: u32, caller: u32 },
    DisplayMismatch { server: String, caller: String },
}
