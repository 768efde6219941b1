//! Error types for cranetrack

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Which half of a relay exchange the local module refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    /// Loading the outbound frame into the transmit buffer
    Stage,
    /// Instructing the module to transmit the staged buffer
    Dispatch,
}

impl std::fmt::Display for RelayStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayStage::Stage => write!(f, "stage"),
            RelayStage::Dispatch => write!(f, "dispatch"),
        }
    }
}

/// cranetrack error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration is syntactically valid but unusable
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Communication timeout
    #[error("Communication timeout")]
    Timeout,

    /// The local module acknowledged a relay step with zero
    #[error("Relay {stage} rejected by local module")]
    RelayRejected {
        /// Step that returned the zero acknowledgement
        stage: RelayStage,
    },

    /// A registry operation's reply carried a rejection status byte
    #[error("Remote device rejected {0}")]
    DeviceRejected(&'static str),

    /// Invalid packet or response
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Checksum mismatch on the register bus
    #[error("Checksum error: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumError {
        /// Expected checksum value
        expected: u16,
        /// Actual checksum value
        actual: u16,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
