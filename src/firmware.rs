/// A parsed firmware image, handed to this crate by the (out of scope) host.
///
/// The host is responsible for container parsing (CAB/archive, checksum
/// manifest, version metadata); this crate only ever sees the already
/// extracted bytes.
#[derive(Debug, Clone)]
pub struct Firmware {
    /// Raw bytes of the whole image, as used by the PixArt protocol.
    pub bytes: Vec<u8>,
    /// Firmware version string, e.g. read from a manifest.
    pub version: String,
}

impl Firmware {
    pub fn new(bytes: Vec<u8>, version: impl Into<String>) -> Self {
        Self {
            bytes,
            version: version.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A Synaptics RMI firmware image: separate `ui` (firmware) and `config`
/// payloads, plus an optional trailing RSA signature on the `ui` image.
///
/// Mirrors `fu_firmware_get_image_by_id("ui"/"config")` in the original V5
/// device source.
#[derive(Debug, Clone)]
pub struct RmiFirmware {
    pub ui: Vec<u8>,
    pub config: Vec<u8>,
    /// Length in bytes of the trailing signature within `ui`, or 0 if the
    /// image is unsigned.
    pub signature_size: usize,
    pub version: String,
}

impl RmiFirmware {
    pub fn new(ui: Vec<u8>, config: Vec<u8>, signature_size: usize, version: impl Into<String>) -> Self {
        Self {
            ui,
            config,
            signature_size,
            version: version.into(),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.signature_size > 0
    }

    /// The firmware body excluding the trailing signature bytes.
    pub fn firmware_body(&self) -> &[u8] {
        let cut = self.ui.len().saturating_sub(self.signature_size);
        &self.ui[..cut]
    }

    /// The trailing signature bytes, empty if unsigned.
    pub fn signature(&self) -> &[u8] {
        let cut = self.ui.len().saturating_sub(self.signature_size);
        &self.ui[cut..]
    }
}
