pub mod flash;
pub mod function;
pub mod hid;
pub mod ps2;
pub mod transport;

pub use flash::{FlashState, RmiV5Flash};
pub use function::RmiFunction;
pub use transport::RmiTransport;
