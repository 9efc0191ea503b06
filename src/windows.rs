use std::ffi::OsString;
use std::iter::once;
use std::mem::align_of;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::ptr;
use std::ptr::slice_from_raw_parts;

use log::{debug, warn};
use windows_sys::core::{PCWSTR, PWSTR};
use windows_sys::Win32::Foundation::{
    GetLastError, LocalFree, SetLastError, ERROR_INSUFFICIENT_BUFFER, FALSE, HANDLE, HLOCAL,
    LPARAM,
};
use windows_sys::Win32::Graphics::Gdi::{
    DEVMODEW, DMCOLOR_COLOR, DMCOLOR_MONOCHROME, DMDUP_HORIZONTAL, DMDUP_SIMPLEX, DMDUP_VERTICAL,
    DMORIENT_LANDSCAPE, DMORIENT_PORTRAIT, DM_COLOR, DM_DUPLEX, DM_ORIENTATION,
};
use windows_sys::Win32::Graphics::Printing::{
    ClosePrinter, DocumentPropertiesW, GetPrinterW, OpenPrinterW, SetPrinterW, DM_IN_BUFFER,
    DM_OUT_BUFFER, PRINTER_ALL_ACCESS, PRINTER_DEFAULTSW, PRINTER_INFO_2W,
};
use windows_sys::Win32::System::Diagnostics::Debug::{
    FormatMessageW, FORMAT_MESSAGE_ALLOCATE_BUFFER, FORMAT_MESSAGE_FROM_SYSTEM,
    FORMAT_MESSAGE_IGNORE_INSERTS,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    SendMessageTimeoutW, HWND_BROADCAST, IDOK, SMTO_NORMAL, WM_DEVMODECHANGE,
};

use crate::buf::SpoolBuf;
use crate::{ColorMode, Duplex, Orientation, SettingsError};

/// Fetch and format the last error.
fn last_error() -> String {
    unsafe {
        let last_err = GetLastError();

        let mut msg: PWSTR = ptr::null_mut();
        // the api misuses a pointer as an out-pointer. (* instead of **).
        // we construct a pointer to the storage location of msg and cast it to PWSTR.
        let p_msg = ((&mut msg) as *mut *mut u16) as PWSTR;

        let msg_len = FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM
                | FORMAT_MESSAGE_IGNORE_INSERTS
                | FORMAT_MESSAGE_ALLOCATE_BUFFER,
            ptr::null(),     // format-str
            last_err,        // errno
            0,               // languageId
            p_msg,           // message buffer
            0,               // nSize. 0=alloc
            ptr::null_mut(), // args: none
        );
        if msg_len == 0 {
            return format!("OS error {}", last_err);
        }

        let s_msg = slice_from_raw_parts(msg, msg_len as usize);
        let os_msg = OsString::from_wide(&*s_msg);
        // FormatMessage terminates the text with \r\n.
        let text = os_msg.to_string_lossy().trim_end().to_string();

        LocalFree(msg as HLOCAL);

        text
    }
}

impl Orientation {
    fn dm_value(self) -> i16 {
        match self {
            Orientation::Portrait => DMORIENT_PORTRAIT as i16,
            Orientation::Landscape => DMORIENT_LANDSCAPE as i16,
        }
    }
}

impl ColorMode {
    fn dm_value(self) -> i16 {
        match self {
            ColorMode::Color => DMCOLOR_COLOR as i16,
            ColorMode::Monochrome => DMCOLOR_MONOCHROME as i16,
        }
    }
}

impl Duplex {
    fn dm_value(self) -> i16 {
        match self {
            Duplex::Simplex => DMDUP_SIMPLEX as i16,
            Duplex::Vertical => DMDUP_VERTICAL as i16,
            Duplex::Horizontal => DMDUP_HORIZONTAL as i16,
        }
    }
}

/// The devmode field bits this operation changes.
fn target_fields() -> u32 {
    DM_ORIENTATION | DM_COLOR | DM_DUPLEX
}

/// Checks that the driver reports all three fields as settable.
/// The first unsupported field decides the error, orientation before color
/// before duplex.
fn check_fields(dm_fields: u32) -> Result<(), SettingsError> {
    if 0 == dm_fields & DM_ORIENTATION {
        return Err(SettingsError::OrientationNotSupported);
    }
    if 0 == dm_fields & DM_COLOR {
        return Err(SettingsError::ColorNotSupported);
    }
    if 0 == dm_fields & DM_DUPLEX {
        return Err(SettingsError::DuplexNotSupported);
    }
    Ok(())
}

/// Where the devmode attached to the info record came from.
///
/// An embedded devmode lives inside the info record's own buffer. A fetched
/// one was queried separately from the driver and owns its buffer, so it is
/// released on its own when this goes out of scope.
#[derive(Debug)]
enum DevModeSource {
    Embedded,
    Fetched(SpoolBuf),
}

/// Spooler handle, closed exactly once on drop.
#[derive(Debug)]
struct PrinterHandle(HANDLE);

impl PrinterHandle {
    /// Opens the named printer with full access, as SetPrinter needs it.
    fn open(wide_name: &[u16]) -> Result<PrinterHandle, SettingsError> {
        unsafe {
            let pd = PRINTER_DEFAULTSW {
                pDatatype: ptr::null_mut(),
                pDevMode: ptr::null_mut(),
                DesiredAccess: PRINTER_ALL_ACCESS,
            };

            let mut handle: HANDLE = 0;
            if 0 != OpenPrinterW(
                wide_name.as_ptr() as PCWSTR,
                &mut handle as *mut HANDLE,
                &pd as *const PRINTER_DEFAULTSW,
            ) && handle != 0
            {
                Ok(PrinterHandle(handle))
            } else {
                Err(SettingsError::PrinterNotFound)
            }
        }
    }
}

impl Drop for PrinterHandle {
    fn drop(&mut self) {
        unsafe {
            if self.0 != 0 {
                ClosePrinter(self.0);
            }
        }
    }
}

/// Changes the printer's default orientation, color mode and duplex setting.
///
/// Reads the full printer configuration, validates that the driver supports
/// all three fields, lets the driver reconcile dependent settings and commits
/// the record back to the spooler. Other running applications are notified
/// with a broadcast, best effort.
pub fn apply_settings(
    pr_name: &str,
    orientation: Orientation,
    color: ColorMode,
    duplex: Duplex,
) -> Result<(), SettingsError> {
    let wide_name = OsString::from(pr_name)
        .encode_wide()
        .chain(once(0))
        .collect::<Vec<u16>>();

    let printer = PrinterHandle::open(&wide_name)?;

    unsafe {
        // The first GetPrinter reports how many bytes the full info record
        // needs. It must fail with ERROR_INSUFFICIENT_BUFFER and a nonzero
        // size, everything else counts as a failed query.
        let mut needed = 0u32;
        SetLastError(0);
        let ok = GetPrinterW(printer.0, 2, ptr::null_mut(), 0, &mut needed as *mut u32);
        if !(ok == FALSE && GetLastError() == ERROR_INSUFFICIENT_BUFFER && needed > 0) {
            return Err(SettingsError::Other(format!(
                "GetPrinter size probe for '{}' failed: {}",
                pr_name,
                last_error()
            )));
        }
        debug!("printer info for '{}' needs {} bytes", pr_name, needed);

        let info_buf = SpoolBuf::zeroed(needed as usize, align_of::<PRINTER_INFO_2W>())
            .ok_or_else(|| {
                SettingsError::Other(format!("allocation of {} bytes failed", needed))
            })?;

        // The second GetPrinter fills in the current configuration.
        if FALSE
            == GetPrinterW(
                printer.0,
                2,
                info_buf.as_mut_ptr(),
                info_buf.len() as u32,
                &mut needed as *mut u32,
            )
        {
            return Err(SettingsError::Other(format!(
                "GetPrinter for '{}' failed: {}",
                pr_name,
                last_error()
            )));
        }

        let pi2 = &mut *(info_buf.as_mut_ptr() as *mut PRINTER_INFO_2W);

        // Some drivers return the info record without a devmode. Query it
        // from the driver directly in that case. That copy has its own
        // buffer and is released independently of the info record.
        let dm_source = if pi2.pDevMode.is_null() {
            debug!("no devmode in the info record, querying DocumentProperties");

            let dm_size = DocumentPropertiesW(
                0,
                printer.0,
                wide_name.as_ptr() as PCWSTR,
                ptr::null_mut(),
                ptr::null(),
                0,
            );
            if dm_size <= 0 {
                return Err(SettingsError::Other(format!(
                    "DocumentProperties size probe for '{}' failed: {}",
                    pr_name,
                    last_error()
                )));
            }

            let dm_buf = SpoolBuf::zeroed(dm_size as usize, align_of::<DEVMODEW>())
                .ok_or_else(|| {
                    SettingsError::Other(format!("allocation of {} bytes failed", dm_size))
                })?;

            if IDOK
                != DocumentPropertiesW(
                    0,
                    printer.0,
                    wide_name.as_ptr() as PCWSTR,
                    dm_buf.as_mut_ptr() as *mut DEVMODEW,
                    ptr::null(),
                    DM_OUT_BUFFER,
                )
            {
                return Err(SettingsError::Other(format!(
                    "DocumentProperties for '{}' failed: {}",
                    pr_name,
                    last_error()
                )));
            }

            pi2.pDevMode = dm_buf.as_mut_ptr() as *mut DEVMODEW;
            DevModeSource::Fetched(dm_buf)
        } else {
            DevModeSource::Embedded
        };

        let dev_mode = &mut *pi2.pDevMode;

        check_fields(dev_mode.dmFields)?;

        // Declare exactly what is being changed and write the new values.
        dev_mode.dmFields = target_fields();
        dev_mode.Anonymous1.Anonymous1.dmOrientation = orientation.dm_value();
        dev_mode.dmColor = color.dm_value();
        dev_mode.dmDuplex = duplex.dm_value();

        // Do not attempt to set the security descriptor.
        pi2.pSecurityDescriptor = ptr::null_mut();

        // Round-trip through the driver so it can fix up dependent fields,
        // paper size and orientation interact for example.
        if IDOK
            != DocumentPropertiesW(
                0,
                printer.0,
                wide_name.as_ptr() as PCWSTR,
                pi2.pDevMode,
                pi2.pDevMode,
                DM_IN_BUFFER | DM_OUT_BUFFER,
            )
        {
            return Err(SettingsError::Other(format!(
                "driver rejected the devmode for '{}': {}",
                pr_name,
                last_error()
            )));
        }

        if FALSE == SetPrinterW(printer.0, 2, info_buf.as_mut_ptr(), 0) {
            return Err(SettingsError::Other(format!(
                "SetPrinter for '{}' failed: {}",
                pr_name,
                last_error()
            )));
        }

        // Tell other apps that there was a change. Best effort, a bounded
        // wait and no error when nobody answers.
        if 0 == SendMessageTimeoutW(
            HWND_BROADCAST,
            WM_DEVMODECHANGE,
            0,
            wide_name.as_ptr() as LPARAM,
            SMTO_NORMAL,
            1000,
            ptr::null_mut(),
        ) {
            warn!("WM_DEVMODECHANGE broadcast for '{}' was not delivered", pr_name);
        }

        // The info record goes away with its buffer. A fetched devmode has
        // its own and is released on its own.
        if let DevModeSource::Fetched(dm) = &dm_source {
            debug!("releasing the {} byte fetched devmode", dm.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_checked_first() {
        // nothing supported at all
        assert_eq!(
            check_fields(0),
            Err(SettingsError::OrientationNotSupported)
        );
        // later bits do not matter while orientation is missing
        assert_eq!(
            check_fields(DM_COLOR | DM_DUPLEX),
            Err(SettingsError::OrientationNotSupported)
        );
    }

    #[test]
    fn color_checked_second() {
        assert_eq!(
            check_fields(DM_ORIENTATION),
            Err(SettingsError::ColorNotSupported)
        );
        assert_eq!(
            check_fields(DM_ORIENTATION | DM_DUPLEX),
            Err(SettingsError::ColorNotSupported)
        );
    }

    #[test]
    fn duplex_checked_last() {
        assert_eq!(
            check_fields(DM_ORIENTATION | DM_COLOR),
            Err(SettingsError::DuplexNotSupported)
        );
    }

    #[test]
    fn full_mask_passes() {
        assert_eq!(check_fields(target_fields()), Ok(()));
        // extra driver bits are fine too
        assert_eq!(check_fields(!0u32), Ok(()));
    }

    #[test]
    fn target_mask_is_exactly_the_three_fields() {
        assert_eq!(target_fields(), DM_ORIENTATION | DM_COLOR | DM_DUPLEX);
        assert_eq!(target_fields().count_ones(), 3);
    }

    #[test]
    fn dm_values() {
        assert_eq!(Orientation::Portrait.dm_value(), DMORIENT_PORTRAIT as i16);
        assert_eq!(Orientation::Landscape.dm_value(), DMORIENT_LANDSCAPE as i16);
        assert_eq!(ColorMode::Color.dm_value(), DMCOLOR_COLOR as i16);
        assert_eq!(ColorMode::Monochrome.dm_value(), DMCOLOR_MONOCHROME as i16);
        assert_eq!(Duplex::Simplex.dm_value(), DMDUP_SIMPLEX as i16);
        assert_eq!(Duplex::Vertical.dm_value(), DMDUP_VERTICAL as i16);
        assert_eq!(Duplex::Horizontal.dm_value(), DMDUP_HORIZONTAL as i16);
    }
}
