pub mod dispatch;
pub mod envelope;
pub mod ops;
pub mod server;

pub use dispatch::{DispatchError, Dispatcher, Services, SetupError};
pub use envelope::{decode, decode_envelope, Envelope, EnvelopeError, ErrorBody};
pub use ops::{Operation, OperationKind};
pub use server::{make_router, shutdown_signal, AppState};
