//! POSIX shared memory region backing the mailbox device

use crate::error::{MailboxError, Result};
use rustix::fd::OwnedFd;
use rustix::fs::ftruncate;
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use rustix::shm::{shm_open, shm_unlink, Mode, ShmOFlags};
use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

const SHM_PREFIX: &str = "/mailbox_";
const MAX_NAME_LEN: usize = 255 - SHM_PREFIX.len();

/// Handle to a mapped shared memory region
pub struct SharedRegion {
    #[allow(dead_code)]
    fd: OwnedFd,
    addr: NonNull<u8>,
    size: usize,
    name: String,
    is_owner: bool,
}

// SAFETY: the mapping stays valid for the handle's lifetime; concurrent
// access to its contents is synchronized by the structures laid out in it
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

fn shm_path(name: &str) -> Result<CString> {
    if name.len() > MAX_NAME_LEN {
        return Err(MailboxError::NameTooLong {
            max: MAX_NAME_LEN,
            got: name.len(),
        });
    }
    CString::new(format!("{}{}", SHM_PREFIX, name))
        .map_err(|_| MailboxError::InvalidName(name.to_string()))
}

/// Map `size` bytes of `fd` read-write and shared
fn map_shared(fd: &OwnedFd, size: usize) -> Result<NonNull<u8>> {
    let addr = unsafe {
        mmap(
            std::ptr::null_mut(),
            size,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::SHARED,
            fd,
            0,
        )
        .map_err(|e| MailboxError::Mmap(e.into()))?
    };

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
        MailboxError::Mmap(io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    })
}

impl SharedRegion {
    /// Create the region for device `name`, zero-filled.
    ///
    /// Fails with `ShmCreate` (`AlreadyExists`) if the name is taken; the
    /// existing region is left untouched.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let path = shm_path(name)?;

        let fd = shm_open(
            path.as_c_str(),
            ShmOFlags::CREATE | ShmOFlags::EXCL | ShmOFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH | Mode::WOTH,
        )
        .map_err(|e| MailboxError::ShmCreate {
            name: name.to_string(),
            source: e.into(),
        })?;

        ftruncate(&fd, size as u64).map_err(|e| MailboxError::Truncate(e.into()))?;

        let addr = map_shared(&fd, size)?;
        unsafe {
            std::ptr::write_bytes(addr.as_ptr(), 0, size);
        }

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Open the region of an existing device
    pub fn open(name: &str) -> Result<Self> {
        let path = shm_path(name)?;
        let open_err = |e: rustix::io::Errno| MailboxError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        };

        let fd = shm_open(path.as_c_str(), ShmOFlags::RDWR, Mode::empty()).map_err(open_err)?;
        let stat = rustix::fs::fstat(&fd).map_err(open_err)?;
        let size = stat.st_size as usize;
        if size == 0 {
            return Err(MailboxError::ShmOpen {
                name: name.to_string(),
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "region is empty"),
            });
        }

        let addr = map_shared(&fd, size)?;

        Ok(Self {
            fd,
            addr,
            size,
            name: name.to_string(),
            is_owner: false,
        })
    }

    /// Remove the name of device `name`; existing mappings stay valid
    pub fn unlink(name: &str) -> Result<()> {
        let path = shm_path(name)?;
        shm_unlink(path.as_c_str()).map_err(|e| MailboxError::ShmOpen {
            name: name.to_string(),
            source: e.into(),
        })
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Device name, without the shm prefix
    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether dropping this handle unlinks the region
    #[inline(always)]
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.addr.as_ptr().cast(), self.size);
        }

        if self.is_owner {
            if let Ok(path) = shm_path(&self.name) {
                let _ = shm_unlink(path.as_c_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_open() {
        let name = "test_region_create";
        let size = 4096;

        let owner = SharedRegion::create(name, size).unwrap();
        assert!(owner.is_owner());
        assert_eq!(owner.size(), size);

        unsafe {
            std::ptr::write(owner.as_ptr().add(17), 42u8);
        }

        let peer = SharedRegion::open(name).unwrap();
        assert!(!peer.is_owner());
        assert_eq!(peer.size(), size);
        assert_eq!(unsafe { std::ptr::read(peer.as_ptr().add(17)) }, 42u8);

        drop(peer);
        drop(owner);
        assert!(SharedRegion::open(name).is_err());
    }

    #[test]
    fn test_create_refuses_existing_name() {
        let name = "test_region_exclusive";
        let owner = SharedRegion::create(name, 4096).unwrap();
        unsafe {
            std::ptr::write(owner.as_ptr(), 7u8);
        }

        match SharedRegion::create(name, 4096) {
            Err(MailboxError::ShmCreate { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("expected ShmCreate, got {:?}", other.map(|r| r.size())),
        }

        // The live region is neither wiped nor unlinked
        let peer = SharedRegion::open(name).unwrap();
        assert_eq!(unsafe { std::ptr::read(peer.as_ptr()) }, 7u8);
        drop(peer);
        drop(owner);
        assert!(SharedRegion::open(name).is_err());
    }

    #[test]
    fn test_unlink_keeps_mapping() {
        let name = "test_region_unlink";
        let region = SharedRegion::create(name, 4096).unwrap();
        SharedRegion::unlink(name).unwrap();
        assert!(SharedRegion::open(name).is_err());
        unsafe {
            std::ptr::write(region.as_ptr(), 1u8);
        }
        // Owner drop tolerates the name being gone
        drop(region);
    }

    #[test]
    fn test_bad_names() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            SharedRegion::open(&long),
            Err(MailboxError::NameTooLong { .. })
        ));
        assert!(matches!(
            SharedRegion::open("nul\0name"),
            Err(MailboxError::InvalidName(_))
        ));
    }
}
