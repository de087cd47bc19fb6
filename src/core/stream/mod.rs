//! VPN-routed stream relay with classified upstream failures

pub mod classify;
pub mod proxy;

pub use classify::{classify_status, FailureClass, StreamError, StreamFailure};
pub use proxy::{
    RelaySummary, ResponseHead, StreamDestination, StreamProber, StreamProxy, WriterDestination,
};
