//!
//! Changes a printer's default orientation, color mode and duplex setting
//! through the windows spooler.
//!
//! The whole operation is [apply_settings]: open the printer, read its
//! configuration record, resolve the devmode, validate driver support for
//! the three fields, write the new values and commit them back.
//!
//! References:
//! https://learn.microsoft.com/en-us/windows/win32/printdocs/getprinter
//! https://learn.microsoft.com/en-us/windows/win32/printdocs/documentproperties

use std::error::Error;
use std::fmt::{Display, Formatter};

#[cfg(any(target_os = "windows", test))]
mod buf;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "windows")]
pub use windows::apply_settings;

/// Page orientation.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Color mode.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    #[default]
    Color,
    Monochrome,
}

/// Duplex mode. Vertical and Horizontal flip on the long and the short
/// edge respectively.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    #[default]
    Simplex,
    Vertical,
    Horizontal,
}

/// Errors while changing printer settings.
///
/// Each variant has a stable numeric code, used as the process exit code
/// by the printmode binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Printer could not be opened.
    PrinterNotFound,
    /// A command line token did not map to a recognized option.
    InvalidArgument(String),
    /// Driver does not expose the duplex field.
    DuplexNotSupported,
    /// Driver does not expose the color field.
    ColorNotSupported,
    /// Driver does not expose the orientation field.
    OrientationNotSupported,
    /// Any allocation, query, negotiation or commit failure.
    Other(String),
}

impl SettingsError {
    /// Numeric code for this error. 0 is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            SettingsError::PrinterNotFound => 10,
            SettingsError::InvalidArgument(_) => 11,
            SettingsError::DuplexNotSupported => 12,
            SettingsError::ColorNotSupported => 13,
            SettingsError::OrientationNotSupported => 14,
            SettingsError::Other(_) => 15,
        }
    }
}

impl Error for SettingsError {}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            SettingsError::PrinterNotFound => write!(f, "Printer not found."),
            SettingsError::InvalidArgument(v) => write!(f, "Invalid option {}.", v),
            SettingsError::DuplexNotSupported => write!(f, "Driver does not support duplex."),
            SettingsError::ColorNotSupported => write!(f, "Driver does not support color."),
            SettingsError::OrientationNotSupported => {
                write!(f, "Driver does not support orientation.")
            }
            SettingsError::Other(v) => write!(f, "{}", v),
        }
    }
}

/// Changing printer settings needs the spooler, which only exists on windows.
#[cfg(not(target_os = "windows"))]
pub fn apply_settings(
    _pr_name: &str,
    _orientation: Orientation,
    _color: ColorMode,
    _duplex: Duplex,
) -> Result<(), SettingsError> {
    Err(SettingsError::Other(
        "printer settings are only supported on windows".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SettingsError::PrinterNotFound.code(), 10);
        assert_eq!(SettingsError::InvalidArgument("x".to_string()).code(), 11);
        assert_eq!(SettingsError::DuplexNotSupported.code(), 12);
        assert_eq!(SettingsError::ColorNotSupported.code(), 13);
        assert_eq!(SettingsError::OrientationNotSupported.code(), 14);
        assert_eq!(SettingsError::Other("x".to_string()).code(), 15);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SettingsError::InvalidArgument("sideways".to_string()).to_string(),
            "Invalid option sideways."
        );
        assert_eq!(
            SettingsError::Other("SetPrinterW failed".to_string()).to_string(),
            "SetPrinterW failed"
        );
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn apply_settings_fails_off_windows() {
        let r = apply_settings(
            "HP-LaserJet",
            Orientation::Landscape,
            ColorMode::Monochrome,
            Duplex::Simplex,
        );
        assert_eq!(r.unwrap_err().code(), 15);
    }
}
