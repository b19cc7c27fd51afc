use std::{ffi::CString, io};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::BackingStore;
use crate::result::{TransportError, TransportResult};

/// Named POSIX shared-memory region backing a cross-process stream.
///
/// The first attacher creates and sizes the region; later attachers map the
/// existing one. The region is unlinked when the last attached stream
/// detaches (tracked best-effort through the header's reader count).
pub struct SharedMemoryBackingStore {
  shm_name: CString,
  ptr: *mut u8,
  len: usize,
  created: bool,
  unlink_on_drop: bool,
}

impl SharedMemoryBackingStore {
  /// Opens (or creates) the named region with the given size.
  pub fn open(name: &str, byte_count: usize) -> TransportResult<Self> {
    let shm_name = CString::new(format!("/{name}"))
      .map_err(|_| TransportError::CorruptHeader("region name contains a NUL byte"))?;

    let (fd, created) = unsafe { open_or_create(&shm_name)? };

    unsafe {
      if created && libc::ftruncate(fd, byte_count as libc::off_t) != 0 {
        let err = io::Error::last_os_error();
        libc::close(fd);
        libc::shm_unlink(shm_name.as_ptr());
        return Err(err.into());
      }

      let ptr = libc::mmap(
        std::ptr::null_mut(),
        byte_count,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        0,
      );
      libc::close(fd);
      if ptr == libc::MAP_FAILED {
        let err = io::Error::last_os_error();
        if created {
          libc::shm_unlink(shm_name.as_ptr());
        }
        return Err(err.into());
      }

      debug!(
        "mapped shared memory region {:?}: {} bytes, created={}",
        shm_name, byte_count, created
      );
      Ok(Self {
        shm_name,
        ptr: ptr as *mut u8,
        len: byte_count,
        created,
        unlink_on_drop: false,
      })
    }
  }
}

/// Opens the region, creating it if it does not exist yet. Retries once on
/// the create/open race so two concurrent first attachers both succeed.
unsafe fn open_or_create(shm_name: &CString) -> TransportResult<(libc::c_int, bool)> {
  for _ in 0..2 {
    let fd = libc::shm_open(shm_name.as_ptr(), libc::O_RDWR, 0o644 as libc::mode_t);
    if fd >= 0 {
      return Ok((fd, false));
    }

    let fd = libc::shm_open(
      shm_name.as_ptr(),
      libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
      0o644 as libc::mode_t,
    );
    if fd >= 0 {
      return Ok((fd, true));
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() != Some(libc::EEXIST) {
      return Err(err.into());
    }
    // lost the creation race; the plain open above will succeed next pass
  }
  Err(io::Error::new(io::ErrorKind::Other, "shm_open create/open race did not settle").into())
}

impl BackingStore for SharedMemoryBackingStore {
  fn ptr(&self) -> *mut u8 {
    self.ptr
  }

  fn len(&self) -> usize {
    self.len
  }

  fn freshly_created(&self) -> bool {
    self.created
  }

  fn on_detach(&mut self, last_attachment: bool) {
    self.unlink_on_drop = last_attachment;
  }
}

impl Drop for SharedMemoryBackingStore {
  fn drop(&mut self) {
    unsafe {
      if self.unlink_on_drop {
        debug!("unlinking shared memory region {:?}", self.shm_name);
        libc::shm_unlink(self.shm_name.as_ptr());
      }
      libc::munmap(self.ptr as *mut libc::c_void, self.len);
    }
  }
}
