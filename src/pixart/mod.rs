pub mod device;
pub mod transport;
pub mod wire;

pub use device::PixartDevice;
pub use transport::HidTransport;
