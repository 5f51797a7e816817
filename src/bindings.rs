//! C Bindings for the mailbox
//!
//! Exposes the in-process service, its sessions and the device client.
//! Every read/write returns a byte count on success or a negative errno
//! (`-EINVAL`, `-ENOMEM`, `-EFAULT`, ...). A null data pointer with a
//! non-zero length is a transfer fault.

use crate::device::DeviceClient;
use crate::error::{MailboxError, Result};
use crate::service::{MailboxConfig, MailboxService, Session};
use rustix::io::Errno;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;
use std::slice;

// Opaque handles
pub struct MailboxHandle(MailboxService);
pub struct SessionHandle(Session);
pub struct DeviceHandle(DeviceClient);

#[repr(C)]
pub struct MailboxOptions {
    pub max_entries: usize,
    pub entry_size: usize,
}

fn status_of(result: Result<usize>) -> isize {
    match result {
        Ok(n) => n as isize,
        Err(e) => e.status() as isize,
    }
}

fn bad_handle() -> isize {
    -(Errno::BADF.raw_os_error() as isize)
}

unsafe fn source<'a>(data: *const u8, len: usize) -> Result<&'a [u8]> {
    if data.is_null() {
        if len == 0 {
            return Ok(&[]);
        }
        return Err(MailboxError::TransferFault("null source buffer"));
    }
    Ok(slice::from_raw_parts(data, len))
}

unsafe fn destination<'a>(buf: *mut u8, len: usize) -> Result<&'a mut [u8]> {
    if buf.is_null() {
        return Err(MailboxError::TransferFault("null destination buffer"));
    }
    Ok(slice::from_raw_parts_mut(buf, len))
}

/// Create a mailbox with the given geometry (zeros select the defaults)
#[no_mangle]
pub extern "C" fn mailbox_create(options: MailboxOptions) -> *mut MailboxHandle {
    let defaults = MailboxConfig::default();
    let config = MailboxConfig {
        max_entries: if options.max_entries == 0 { defaults.max_entries } else { options.max_entries },
        entry_size: if options.entry_size == 0 { defaults.entry_size } else { options.entry_size },
    };
    Box::into_raw(Box::new(MailboxHandle(MailboxService::with_config(config))))
}

/// Destroy a mailbox handle; open sessions stay valid
#[no_mangle]
pub unsafe extern "C" fn mailbox_destroy(handle: *mut MailboxHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Write a payload to the mailbox
#[no_mangle]
pub unsafe extern "C" fn mailbox_write(handle: *const MailboxHandle, data: *const u8, len: usize) -> isize {
    let Some(mailbox) = handle.as_ref() else {
        return bad_handle();
    };
    status_of(source(data, len).and_then(|payload| mailbox.0.write(payload)))
}

/// Read up to `max_len` bytes of the current view at `offset`
#[no_mangle]
pub unsafe extern "C" fn mailbox_read(
    handle: *const MailboxHandle,
    offset: u64,
    buf: *mut u8,
    max_len: usize,
) -> isize {
    let Some(mailbox) = handle.as_ref() else {
        return bad_handle();
    };
    status_of(destination(buf, max_len).and_then(|dst| mailbox.0.read_into(offset, dst)))
}

/// Number of stored messages
#[no_mangle]
pub unsafe extern "C" fn mailbox_len(handle: *const MailboxHandle) -> usize {
    handle.as_ref().map_or(0, |mailbox| mailbox.0.ring().len())
}

// --- Sessions ---

/// Open a session (an independent handle) on a mailbox
#[no_mangle]
pub unsafe extern "C" fn mailbox_session_open(handle: *const MailboxHandle) -> *mut SessionHandle {
    match handle.as_ref() {
        Some(mailbox) => Box::into_raw(Box::new(SessionHandle(mailbox.0.open()))),
        None => ptr::null_mut(),
    }
}

/// Close a session
#[no_mangle]
pub unsafe extern "C" fn mailbox_session_close(session: *mut SessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Session: write a payload
#[no_mangle]
pub unsafe extern "C" fn mailbox_session_write(session: *mut SessionHandle, data: *const u8, len: usize) -> isize {
    let Some(session) = session.as_mut() else {
        return bad_handle();
    };
    status_of(source(data, len).and_then(|payload| session.0.write(payload)))
}

/// Session: read from the pinned view
#[no_mangle]
pub unsafe extern "C" fn mailbox_session_read(
    session: *mut SessionHandle,
    offset: u64,
    buf: *mut u8,
    max_len: usize,
) -> isize {
    let Some(session) = session.as_mut() else {
        return bad_handle();
    };
    status_of(destination(buf, max_len).and_then(|dst| session.0.read_into(offset, dst)))
}

// --- Device Side ---

/// Connect to a running mailbox device
#[no_mangle]
pub unsafe extern "C" fn mailbox_device_connect(name: *const c_char) -> *mut DeviceHandle {
    if name.is_null() {
        return ptr::null_mut();
    }

    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return ptr::null_mut();
    };

    match DeviceClient::connect(name) {
        Ok(client) => Box::into_raw(Box::new(DeviceHandle(client))),
        Err(_) => ptr::null_mut(),
    }
}

/// Disconnect from a device
#[no_mangle]
pub unsafe extern "C" fn mailbox_device_close(handle: *mut DeviceHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Device: write a payload
#[no_mangle]
pub unsafe extern "C" fn mailbox_device_write(handle: *mut DeviceHandle, data: *const u8, len: usize) -> isize {
    let Some(device) = handle.as_mut() else {
        return bad_handle();
    };
    status_of(source(data, len).and_then(|payload| device.0.write(payload)))
}

/// Device: read up to `max_len` bytes at `offset`
#[no_mangle]
pub unsafe extern "C" fn mailbox_device_read(
    handle: *mut DeviceHandle,
    offset: u64,
    buf: *mut u8,
    max_len: usize,
) -> isize {
    let Some(device) = handle.as_mut() else {
        return bad_handle();
    };
    status_of(destination(buf, max_len).and_then(|dst| device.0.read_into(offset, dst)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EINVAL: isize = -22;
    const EFAULT: isize = -14;

    fn defaults() -> MailboxOptions {
        MailboxOptions {
            max_entries: 0,
            entry_size: 0,
        }
    }

    #[test]
    fn test_write_read_through_c_api() {
        unsafe {
            let mailbox = mailbox_create(defaults());
            assert_eq!(mailbox_write(mailbox, b"hello".as_ptr(), 5), 5);
            assert_eq!(mailbox_write(mailbox, b"world".as_ptr(), 5), 5);
            assert_eq!(mailbox_len(mailbox), 2);

            let mut buf = [0u8; 64];
            let n = mailbox_read(mailbox, 0, buf.as_mut_ptr(), buf.len());
            assert_eq!(&buf[..n as usize], b"helloworld");

            assert_eq!(mailbox_write(mailbox, b"LAST".as_ptr(), 4), 4);
            let n = mailbox_read(mailbox, 0, buf.as_mut_ptr(), buf.len());
            assert_eq!(&buf[..n as usize], b"world\n");

            mailbox_destroy(mailbox);
        }
    }

    #[test]
    fn test_errors_are_negative_errno() {
        unsafe {
            let mailbox = mailbox_create(defaults());
            let big = [b'x'; 129];

            assert_eq!(mailbox_write(mailbox, big.as_ptr(), big.len()), EINVAL);
            assert_eq!(mailbox_write(mailbox, ptr::null(), 0), EINVAL);
            assert_eq!(mailbox_write(mailbox, ptr::null(), 3), EFAULT);
            assert_eq!(mailbox_read(mailbox, 0, ptr::null_mut(), 16), EFAULT);
            assert_eq!(mailbox_write(ptr::null(), b"x".as_ptr(), 1), bad_handle());
            assert_eq!(mailbox_len(mailbox), 0);

            mailbox_destroy(mailbox);
        }
    }

    #[test]
    fn test_sessions_through_c_api() {
        unsafe {
            let mailbox = mailbox_create(MailboxOptions {
                max_entries: 2,
                entry_size: 0,
            });
            let session = mailbox_session_open(mailbox);
            for msg in [&b"a"[..], b"b", b"c"] {
                assert_eq!(mailbox_session_write(session, msg.as_ptr(), msg.len()), 1);
            }

            let mut buf = [0u8; 1];
            assert_eq!(mailbox_session_read(session, 0, buf.as_mut_ptr(), 1), 1);
            assert_eq!(&buf, b"b");
            mailbox_write(mailbox, b"CLEAR".as_ptr(), 5);
            assert_eq!(mailbox_session_read(session, 1, buf.as_mut_ptr(), 1), 1);
            assert_eq!(&buf, b"c");
            assert_eq!(mailbox_session_read(session, 2, buf.as_mut_ptr(), 1), 0);

            // Sessions outlive the mailbox handle
            mailbox_destroy(mailbox);
            assert_eq!(mailbox_session_write(session, b"d".as_ptr(), 1), 1);
            mailbox_session_close(session);
        }
    }

    #[test]
    fn test_device_connect_failures() {
        unsafe {
            assert!(mailbox_device_connect(ptr::null()).is_null());
            let name = b"test_bindings_missing_device\0";
            assert!(mailbox_device_connect(name.as_ptr() as *const c_char).is_null());
            assert_eq!(mailbox_device_write(ptr::null_mut(), b"x".as_ptr(), 1), bad_handle());
        }
    }
}
