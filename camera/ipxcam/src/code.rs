//! Numeric status codes.
//!
//! Camera and transport layer calls report a signed 32 bit code where 0 is
//! success, negative values are errors and positive values are warnings.
//! [crate::Error::code] maps every error of this crate onto one of these.

/// A camera or transport layer status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const OK: Self = Self(0);

    // GenTL transport layer codes
    pub const GC_ERROR: Self = Self(-1001);
    pub const GC_NOT_INITIALIZED: Self = Self(-1002);
    pub const GC_NOT_IMPLEMENTED: Self = Self(-1003);
    pub const GC_RESOURCE_IN_USE: Self = Self(-1004);
    pub const GC_ACCESS_DENIED: Self = Self(-1005);
    pub const GC_INVALID_HANDLE: Self = Self(-1006);
    pub const GC_INVALID_ID: Self = Self(-1007);
    pub const GC_NO_DATA: Self = Self(-1008);
    pub const GC_INVALID_PARAMETER: Self = Self(-1009);
    pub const GC_IO: Self = Self(-1010);
    pub const GC_TIMEOUT: Self = Self(-1011);
    pub const GC_ABORT: Self = Self(-1012);
    pub const GC_INVALID_BUFFER: Self = Self(-1013);
    pub const GC_NOT_AVAILABLE: Self = Self(-1014);
    pub const GC_INVALID_ADDRESS: Self = Self(-1015);
    pub const GC_BUFFER_TOO_SMALL: Self = Self(-1016);
    pub const GC_INVALID_INDEX: Self = Self(-1017);
    pub const GC_PARSING_CHUNK_DATA: Self = Self(-1018);
    pub const GC_INVALID_VALUE: Self = Self(-1019);
    pub const GC_RESOURCE_EXHAUSTED: Self = Self(-1020);
    pub const GC_OUT_OF_MEMORY: Self = Self(-1021);
    pub const GC_BUSY: Self = Self(-1022);

    // camera library codes
    pub const UNKNOWN: Self = Self(-40001);
    pub const FILE_NOT_FOUND: Self = Self(-40002);
    pub const FILE_READ: Self = Self(-40003);
    pub const WRONG_CONFIGURATION: Self = Self(-40004);
    pub const INVALID_INDEX: Self = Self(-40005);
    pub const NO_DEVICE: Self = Self(-40006);
    pub const INVALID_ARGUMENT: Self = Self(-40007);
    pub const INVALID_STATE: Self = Self(-40051);
    pub const FLASH_ERASE: Self = Self(-40101);

    // parameter tree codes
    pub const GENICAM_GENERIC: Self = Self(-40200);
    pub const GENICAM_TREE: Self = Self(-40201);
    pub const GENICAM_ACCESS: Self = Self(-40202);
    pub const GENICAM_TYPE: Self = Self(-40203);
    pub const GENICAM_OUT_OF_RANGE: Self = Self(-40204);
    pub const GENICAM_UNKNOWN_PARAM: Self = Self(-40205);
    pub const GENICAM_INVALID_ARGUMENT: Self = Self(-40206);
    pub const GENICAM_RUNTIME: Self = Self(-40207);

    pub const fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_error(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_warning(&self) -> bool {
        self.0 > 0
    }

    /// Human readable description of the code.
    pub fn message(&self) -> &'static str {
        match *self {
            Self::OK => "OK",
            Self::GC_ERROR => "GenTL: Unspecified error",
            Self::GC_NOT_INITIALIZED => "GenTL: Module not initialized",
            Self::GC_NOT_IMPLEMENTED => "GenTL: Not implemented",
            Self::GC_RESOURCE_IN_USE => "GenTL: Resource in use",
            Self::GC_ACCESS_DENIED => "GenTL: Access denied",
            Self::GC_INVALID_HANDLE => "GenTL: Invalid handle",
            Self::GC_INVALID_ID => "GenTL: Invalid ID",
            Self::GC_NO_DATA => "GenTL: No data",
            Self::GC_INVALID_PARAMETER => "GenTL: Invalid parameter",
            Self::GC_IO => "GenTL: IO error",
            Self::GC_TIMEOUT => "GenTL: Timeout",
            Self::GC_ABORT => "GenTL: Operation aborted",
            Self::GC_INVALID_BUFFER => "GenTL: Invalid buffer",
            Self::GC_NOT_AVAILABLE => "GenTL: Not available",
            Self::GC_INVALID_ADDRESS => "GenTL: Invalid address",
            Self::GC_BUFFER_TOO_SMALL => "GenTL: Buffer too small",
            Self::GC_INVALID_INDEX => "GenTL: Invalid index",
            Self::GC_PARSING_CHUNK_DATA => "GenTL: Error parsing chunk data",
            Self::GC_INVALID_VALUE => "GenTL: Invalid value",
            Self::GC_RESOURCE_EXHAUSTED => "GenTL: Resource exhausted",
            Self::GC_OUT_OF_MEMORY => "GenTL: Out of memory",
            Self::GC_BUSY => "GenTL: Busy",
            Self::UNKNOWN => "Unknown error",
            Self::FILE_NOT_FOUND => "File not found",
            Self::FILE_READ => "File read error",
            Self::WRONG_CONFIGURATION => "Wrong configuration",
            Self::INVALID_INDEX => "Invalid index",
            Self::NO_DEVICE => "No device",
            Self::INVALID_ARGUMENT => "Invalid argument",
            Self::INVALID_STATE => "Invalid state",
            Self::FLASH_ERASE => "Flash erase error",
            Self::GENICAM_GENERIC => "GenICam: Generic error",
            Self::GENICAM_TREE => "GenICam: Tree error",
            Self::GENICAM_ACCESS => "GenICam: Access error",
            Self::GENICAM_TYPE => "GenICam: Parameter type is invalid",
            Self::GENICAM_OUT_OF_RANGE => "GenICam: Parameter is out of range",
            Self::GENICAM_UNKNOWN_PARAM => "GenICam: Unknown param",
            Self::GENICAM_INVALID_ARGUMENT => "GenICam: Invalid argument",
            Self::GENICAM_RUNTIME => "GenICam: Runtime error",
            _ => "Unknown code",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.0)
    }
}

/// Component byte of a [ToolsCode].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Serializer,
    Bayer,
    TrueSense,
    Display,
    Converter,
    Unpacker,
    ParamStorage,
    Unknown,
}

impl Component {
    pub const fn id(&self) -> u32 {
        match self {
            Self::Serializer => 0x01,
            Self::Bayer => 0x05,
            Self::TrueSense => 0x06,
            Self::Display => 0x07,
            Self::Converter => 0x08,
            Self::Unpacker => 0x09,
            Self::ParamStorage => 0x81,
            Self::Unknown => 0xFF,
        }
    }

    pub fn from_id(id: u32) -> Self {
        match id {
            0x01 => Self::Serializer,
            0x05 => Self::Bayer,
            0x06 => Self::TrueSense,
            0x07 => Self::Display,
            0x08 => Self::Converter,
            0x09 => Self::Unpacker,
            0x81 => Self::ParamStorage,
            _ => Self::Unknown,
        }
    }
}

/// Status word of the image tool components.
///
/// Layout: bit 31 is the failure flag, bits 16..24 the component and the
/// low 16 bits the base code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolsCode(pub u32);

impl ToolsCode {
    pub const FAILURE_BIT: u32 = 0x8000_0000;

    pub const OK: u16 = 0;
    pub const UNKNOWN: u16 = 1;
    pub const FILE_NOT_FOUND: u16 = 2;
    pub const NOT_SUPPORTED: u16 = 3;
    pub const ACCESS_DENIED: u16 = 4;
    pub const OUT_OF_RANGE: u16 = 5;
    pub const BUFFER_TOO_SMALL: u16 = 6;
    pub const INVALID_ARGUMENT: u16 = 7;
    pub const NULL_POINTER: u16 = 8;
    pub const NOT_ENOUGH_MEMORY: u16 = 9;
    pub const NOT_IMPLEMENTED: u16 = 10;

    pub const fn error(component: Component, code: u16) -> Self {
        Self(Self::FAILURE_BIT | (component.id() << 16) | code as u32)
    }

    pub const fn warning(component: Component, code: u16) -> Self {
        Self((component.id() << 16) | code as u32)
    }

    pub const fn is_success(&self) -> bool {
        self.0 & 0xFFFF == 0
    }

    pub const fn is_failure(&self) -> bool {
        self.0 > Self::FAILURE_BIT
    }

    pub const fn is_warning(&self) -> bool {
        self.0 < Self::FAILURE_BIT && self.0 != 0
    }

    pub fn component(&self) -> Component {
        Component::from_id((self.0 >> 16) & 0xFF)
    }

    pub const fn base(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}
