//! Device status codes.
//!
//! Both backends carry a one-byte status code: the HID backend in the first
//! frame of every response, the ACM backend in dedicated status frames.
//! Zero means success, everything else maps to a [`DeviceStatus`].

use thiserror::Error;

/// Non-success status reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DeviceStatus {
    #[error("rebooting")]
    Rebooting,
    #[error("try again")]
    TryAgain,
    #[error("unidentified host error")]
    UnidentifiedHostError,
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("no such file or directory")]
    NoSuchFileOrDirectory,
    #[error("directory exists")]
    DirectoryExists,
    #[error("file exists")]
    FileExists,
    #[error("operation not permitted")]
    OperationNotPermitted,
    #[error("no such user")]
    NoSuchUser,
    #[error("timeout")]
    Timeout,
    #[error("unidentified device error")]
    UnidentifiedDeviceError,
    #[error("not implemented")]
    NotImplemented,
    #[error("system busy")]
    SystemBusy,
    #[error("invalid content")]
    InvalidContent,
    #[error("checksum failure")]
    ChecksumFailure,
    #[error("disk full")]
    DiskFull,
    #[error("prerequisite not found")]
    PrerequisiteNotFound,
    #[error("insufficient buffer")]
    InsufficientBuffer,
    #[error("wait for idling")]
    WaitForIdling,
    #[error("unknown status code {0}")]
    Unknown(u8),
}

impl DeviceStatus {
    /// Map a raw status code. Returns `None` for success (zero).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            0 => return None,
            1 => Self::Rebooting,
            2 => Self::TryAgain,
            100 => Self::UnidentifiedHostError,
            101 => Self::InvalidCommand,
            102 => Self::InvalidParameter,
            103 => Self::NoSuchFileOrDirectory,
            104 => Self::DirectoryExists,
            105 => Self::FileExists,
            106 => Self::OperationNotPermitted,
            107 => Self::NoSuchUser,
            108 => Self::Timeout,
            200 => Self::UnidentifiedDeviceError,
            201 => Self::NotImplemented,
            202 => Self::SystemBusy,
            203 => Self::InvalidContent,
            204 => Self::ChecksumFailure,
            205 => Self::DiskFull,
            206 => Self::PrerequisiteNotFound,
            207 => Self::InsufficientBuffer,
            208 => Self::WaitForIdling,
            other => Self::Unknown(other),
        };
        Some(status)
    }

    /// `Ok(())` for a zero code, the mapped status otherwise.
    pub const fn check(code: u8) -> Result<(), Self> {
        match Self::from_code(code) {
            None => Ok(()),
            Some(status) => Err(status),
        }
    }

    /// The raw code this status was decoded from.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Rebooting => 1,
            Self::TryAgain => 2,
            Self::UnidentifiedHostError => 100,
            Self::InvalidCommand => 101,
            Self::InvalidParameter => 102,
            Self::NoSuchFileOrDirectory => 103,
            Self::DirectoryExists => 104,
            Self::FileExists => 105,
            Self::OperationNotPermitted => 106,
            Self::NoSuchUser => 107,
            Self::Timeout => 108,
            Self::UnidentifiedDeviceError => 200,
            Self::NotImplemented => 201,
            Self::SystemBusy => 202,
            Self::InvalidContent => 203,
            Self::ChecksumFailure => 204,
            Self::DiskFull => 205,
            Self::PrerequisiteNotFound => 206,
            Self::InsufficientBuffer => 207,
            Self::WaitForIdling => 208,
            Self::Unknown(code) => code,
        }
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::TryAgain | Self::SystemBusy | Self::WaitForIdling | Self::Rebooting
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TABLE: &[(u8, DeviceStatus)] = &[
        (1, DeviceStatus::Rebooting),
        (2, DeviceStatus::TryAgain),
        (100, DeviceStatus::UnidentifiedHostError),
        (101, DeviceStatus::InvalidCommand),
        (102, DeviceStatus::InvalidParameter),
        (103, DeviceStatus::NoSuchFileOrDirectory),
        (104, DeviceStatus::DirectoryExists),
        (105, DeviceStatus::FileExists),
        (106, DeviceStatus::OperationNotPermitted),
        (107, DeviceStatus::NoSuchUser),
        (108, DeviceStatus::Timeout),
        (200, DeviceStatus::UnidentifiedDeviceError),
        (201, DeviceStatus::NotImplemented),
        (202, DeviceStatus::SystemBusy),
        (203, DeviceStatus::InvalidContent),
        (204, DeviceStatus::ChecksumFailure),
        (205, DeviceStatus::DiskFull),
        (206, DeviceStatus::PrerequisiteNotFound),
        (207, DeviceStatus::InsufficientBuffer),
        (208, DeviceStatus::WaitForIdling),
    ];

    #[test]
    fn test_zero_is_success() {
        assert_eq!(DeviceStatus::from_code(0), None);
        assert!(DeviceStatus::check(0).is_ok());
    }

    #[test]
    fn test_table_codes_map_to_distinct_kinds() {
        for &(code, expected) in TABLE {
            assert_eq!(DeviceStatus::check(code), Err(expected));
            assert_eq!(expected.code(), code);
        }

        let kinds: HashSet<_> = TABLE.iter().map(|&(_, status)| status).collect();
        assert_eq!(kinds.len(), TABLE.len());
    }

    #[test]
    fn test_unlisted_code_is_unknown() {
        assert_eq!(DeviceStatus::from_code(42), Some(DeviceStatus::Unknown(42)));
        assert_eq!(DeviceStatus::Unknown(42).to_string(), "unknown status code 42");
    }
}
