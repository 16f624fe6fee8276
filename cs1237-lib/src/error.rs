use thiserror::Error;

/// The primary error type for the `cs1237-lib` crate.
///
/// `PinErr` is the error type of the underlying GPIO pins; the simulator uses
/// `core::convert::Infallible` here.
#[derive(Error, Debug)]
pub enum Cs1237Error<PinErr> {
    #[error("pin error: {0:?}")]
    Pin(PinErr),

    /// The chip never pulled the data line low within the transaction budget.
    /// Likely a wiring or power problem; safe to retry from the caller.
    #[error("timeout waiting for the chip to signal data ready")]
    Timeout,

    /// The chip answered, but with data the active policy considers
    /// implausible.
    #[error("chip returned implausible data: {0}")]
    InvalidResponse(&'static str),

    #[error("malformed remote command: {0}")]
    RemoteCommand(#[from] serde_json::Error),
}
