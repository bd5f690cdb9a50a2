pub mod daemon;
pub mod dispatch;
pub mod framing;
pub mod locate;
pub mod protocol;
