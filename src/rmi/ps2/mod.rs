pub mod adaptor;
pub mod channel;

pub use adaptor::{Ps2ModeSwitch, Ps2RmiAdaptor};
pub use channel::Ps2Channel;
