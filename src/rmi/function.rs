/// An RMI4 function record, as enumerated by the page description table.
/// PDT scanning itself is out of scope for this crate; the host hands these
/// records in already resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmiFunction {
    pub function_number: u8,
    pub query_base: u16,
    pub data_base: u16,
    pub command_base: u16,
    pub control_base: u16,
    pub function_version: u8,
    pub interrupt_source_mask: u8,
}
