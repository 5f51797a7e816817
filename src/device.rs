//! Mailbox device: a daemon-owned mailbox reachable from other processes
//!
//! The daemon ([`DeviceServer`]) owns a [`MailboxService`] and a shared
//! memory region. Clients ([`DeviceClient`]) claim a client slot, push
//! request frames onto the MPSC queue and wait for the response carrying
//! their request id in their own seqlock slot. Each client slot maps to one
//! server-side [`Session`], so a client behaves like an open file handle.
//!
//! # Region layout
//! ```text
//! [DeviceHeader][request queue][client claims: AtomicU32 x N][response slot x N]
//! ```

use crate::error::{MailboxError, Result};
use crate::mpsc_queue::{MpscConsumer, MpscProducer, MpscQueueHeader, MAX_REQUEST_SIZE};
use crate::protocol::{
    Request, RequestFrame, ResponseHeader, MAX_WRITE_PAYLOAD, RESPONSE_HEADER_SIZE,
};
use crate::seqlock::{SeqLockHeader, SeqLockReader, SeqLockWriter};
use crate::service::{MailboxService, Session};
use crate::shm::SharedRegion;
use rustix::io::Errno;
use rustix::process::{getpid, test_kill_process, Pid};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Magic number for device validation
const DEVICE_MAGIC: u32 = 0x4D42_4F58; // "MBOX"
const DEVICE_VERSION: u32 = 1;

/// Name the daemon and client use when none is given
pub const DEFAULT_DEVICE_NAME: &str = "chardev";

const DEFAULT_REQUEST_SLOTS: usize = 32;
const DEFAULT_MAX_CLIENTS: usize = 16;
const DEFAULT_RESPONSE_SIZE: usize = 4096;
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_RESPONSE_SIZE: usize = 256;

/// Spins on an empty queue before the daemon naps
const IDLE_SPINS: u32 = 4096;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Cache line size
const CACHE_LINE_SIZE: usize = 64;

const SLOT_FREE: u32 = 0;
const SLOT_CLAIMED: u32 = 1;

/// Device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Number of request queue slots
    pub request_slots: usize,
    /// Maximum number of simultaneously connected clients
    pub max_clients: usize,
    /// Size of each client's response region in bytes
    pub response_size: usize,
    /// How long a client waits for a response
    pub response_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            request_slots: DEFAULT_REQUEST_SLOTS,
            max_clients: DEFAULT_MAX_CLIENTS,
            response_size: DEFAULT_RESPONSE_SIZE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// Device header stored at the beginning of shared memory
#[repr(C, align(64))]
struct DeviceHeader {
    magic: u32,
    version: u32,
    /// Process id of the daemon serving the region
    owner_pid: u32,
    _reserved: u32,
    request_slots: usize,
    max_clients: usize,
    response_size: usize,
    entry_size: usize,
    next_request_id: AtomicU64,
}

#[inline]
fn align(size: usize) -> usize {
    (size + CACHE_LINE_SIZE - 1) & !(CACHE_LINE_SIZE - 1)
}

/// Offsets of each region, derived from the geometry in the header
struct RegionLayout {
    queue_offset: usize,
    claims_offset: usize,
    responses_offset: usize,
    response_stride: usize,
    total: usize,
}

impl RegionLayout {
    fn new(request_slots: usize, max_clients: usize, response_size: usize) -> Self {
        let queue_offset = align(std::mem::size_of::<DeviceHeader>());
        let claims_offset = queue_offset + align(MpscQueueHeader::size_for_slots(request_slots));
        let responses_offset =
            claims_offset + align(max_clients * std::mem::size_of::<AtomicU32>());
        let response_stride = align(SeqLockHeader::size_for(response_size));

        Self {
            queue_offset,
            claims_offset,
            responses_offset,
            response_stride,
            total: responses_offset + max_clients * response_stride,
        }
    }

    /// Pointers to the seqlock header and data of client slot `index`
    unsafe fn response_slot(&self, base: *mut u8, index: usize) -> (*mut SeqLockHeader, *mut u8) {
        let slot = base.add(self.responses_offset + index * self.response_stride);
        (
            slot as *mut SeqLockHeader,
            slot.add(std::mem::size_of::<SeqLockHeader>()),
        )
    }
}

/// Unlink the region of device `name` if the daemon that created it is gone.
///
/// Fails with `ShmCreate` (`AlreadyExists`) while the owner is alive or the
/// region does not look like a mailbox device.
fn reclaim_stale(name: &str) -> Result<()> {
    let busy = || MailboxError::ShmCreate {
        name: name.to_string(),
        source: Errno::EXIST.into(),
    };

    let region = match SharedRegion::open(name) {
        Ok(region) => region,
        // Removed since our create attempt
        Err(MailboxError::ShmOpen { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return Ok(())
        }
        Err(e) => return Err(e),
    };
    if region.size() < std::mem::size_of::<DeviceHeader>() {
        return Err(busy());
    }

    let (magic, owner_pid) = unsafe {
        let header = region.as_ptr() as *const DeviceHeader;
        ((*header).magic, (*header).owner_pid)
    };
    if magic != DEVICE_MAGIC || owner_alive(owner_pid) {
        return Err(busy());
    }

    warn!(device = name, owner_pid, "reclaiming region of a dead daemon");
    drop(region);
    SharedRegion::unlink(name)
}

fn owner_alive(pid: u32) -> bool {
    let Some(pid) = i32::try_from(pid).ok().and_then(Pid::from_raw) else {
        return false;
    };
    // EPERM still means the process exists
    !matches!(test_kill_process(pid), Err(Errno::SRCH))
}

/// Largest read payload a response of `response_size` bytes can carry
fn max_read_len(response_size: usize) -> usize {
    response_size - 8 - RESPONSE_HEADER_SIZE
}

/// Daemon side of the device
pub struct DeviceServer {
    region: SharedRegion,
    requests: MpscConsumer,
    responses: Vec<SeqLockWriter>,
    service: MailboxService,
    max_read_len: usize,
}

// SAFETY: the server is driven from one thread at a time; the region it
// points into lives as long as `region`
unsafe impl Send for DeviceServer {}

impl DeviceServer {
    /// Create the device region `name` and attach `service` to it
    pub fn create(name: &str, config: DeviceConfig, service: MailboxService) -> Result<Self> {
        let request_slots = config.request_slots.max(1);
        let max_clients = config.max_clients.max(1);
        let response_size = config.response_size.max(MIN_RESPONSE_SIZE);

        let layout = RegionLayout::new(request_slots, max_clients, response_size);
        let region = match SharedRegion::create(name, layout.total) {
            Err(MailboxError::ShmCreate { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists =>
            {
                reclaim_stale(name)?;
                SharedRegion::create(name, layout.total)?
            }
            other => other?,
        };
        let base = region.as_ptr();

        unsafe {
            (base as *mut DeviceHeader).write(DeviceHeader {
                magic: DEVICE_MAGIC,
                version: DEVICE_VERSION,
                owner_pid: getpid().as_raw_nonzero().get() as u32,
                _reserved: 0,
                request_slots,
                max_clients,
                response_size,
                entry_size: service.config().entry_size,
                next_request_id: AtomicU64::new(1),
            });

            let queue = base.add(layout.queue_offset) as *mut MpscQueueHeader;
            MpscQueueHeader::init(queue, request_slots);
            let requests = MpscConsumer::from_raw(queue);

            let responses = (0..max_clients)
                .map(|i| {
                    let (header, data) = layout.response_slot(base, i);
                    SeqLockHeader::init(header, response_size);
                    SeqLockWriter::from_raw(header, data)
                })
                .collect();

            info!(
                device = name,
                size = layout.total,
                max_clients,
                request_slots,
                "mailbox device created"
            );

            Ok(Self {
                region,
                requests,
                responses,
                service,
                max_read_len: max_read_len(response_size),
            })
        }
    }

    /// Name of the device
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Serve requests until a client asks for shutdown
    pub fn run(&self) {
        let mut sessions: HashMap<u32, Session> = HashMap::new();
        let mut buf = [0u8; MAX_REQUEST_SIZE];

        info!(device = self.name(), "serving mailbox device");

        loop {
            let Some((client_id, len)) = self.requests.pop_with_spins(&mut buf, IDLE_SPINS) else {
                thread::sleep(IDLE_SLEEP);
                continue;
            };

            let Some(frame) = RequestFrame::decode(&buf[..len]) else {
                warn!(client_id, len, "dropping malformed request");
                continue;
            };

            if !self.handle(&mut sessions, client_id, frame) {
                break;
            }
        }

        info!(device = self.name(), sessions = sessions.len(), "mailbox device stopped");
    }

    /// Handle one request; returns false once the loop should stop
    fn handle(&self, sessions: &mut HashMap<u32, Session>, client_id: u32, frame: RequestFrame<'_>) -> bool {
        let Some(slot) = (client_id as usize)
            .checked_sub(1)
            .and_then(|index| self.responses.get(index))
        else {
            warn!(client_id, "request from unknown client slot");
            return true;
        };

        let respond = |status: i32, payload: &[u8]| {
            let header = ResponseHeader {
                request_id: frame.request_id,
                status,
            };
            slot.write_frame(&[&header.to_bytes()[..], payload]);
        };

        match frame.request {
            Request::Open => {
                sessions.insert(client_id, self.service.open());
                debug!(client_id, "session opened");
                respond(0, &[]);
            }
            Request::Close => {
                sessions.remove(&client_id);
                debug!(client_id, "session closed");
                respond(0, &[]);
            }
            Request::Write(payload) => {
                let session = sessions
                    .entry(client_id)
                    .or_insert_with(|| self.service.open());
                match session.write(payload) {
                    Ok(written) => respond(written as i32, &[]),
                    Err(e) => {
                        debug!(client_id, len = payload.len(), error = %e, "write rejected");
                        respond(e.status(), &[]);
                    }
                }
            }
            Request::Read { offset, max_len } => {
                let session = sessions
                    .entry(client_id)
                    .or_insert_with(|| self.service.open());
                match session.read(offset, (max_len as usize).min(self.max_read_len)) {
                    Ok(bytes) => respond(bytes.len() as i32, &bytes),
                    Err(e) => {
                        debug!(client_id, offset, error = %e, "read failed");
                        respond(e.status(), &[]);
                    }
                }
            }
            Request::Shutdown => {
                info!(client_id, "shutdown requested");
                respond(0, &[]);
                return false;
            }
        }

        true
    }
}

/// Client side of the device; one instance is one open handle
pub struct DeviceClient {
    region: SharedRegion,
    header: *const DeviceHeader,
    claim: *const AtomicU32,
    requests: MpscProducer,
    response: SeqLockReader,
    client_id: u32,
    entry_size: usize,
    max_read_len: usize,
    timeout: Duration,
    position: u64,
    frame: Vec<u8>,
}

// SAFETY: all shared state is reached through atomics or the seqlock
unsafe impl Send for DeviceClient {}

impl DeviceClient {
    /// Connect to device `name` and open a session on it
    pub fn connect(name: &str) -> Result<Self> {
        Self::connect_with_timeout(name, DEFAULT_RESPONSE_TIMEOUT)
    }

    /// Connect, waiting at most `timeout` for each response
    pub fn connect_with_timeout(name: &str, timeout: Duration) -> Result<Self> {
        let region = SharedRegion::open(name)?;
        let base = region.as_ptr();

        if region.size() < std::mem::size_of::<DeviceHeader>() {
            return Err(MailboxError::InvalidMagic {
                expected: DEVICE_MAGIC,
                got: 0,
            });
        }

        unsafe {
            let header = base as *const DeviceHeader;
            let magic = (*header).magic;
            if magic != DEVICE_MAGIC || (*header).version != DEVICE_VERSION {
                return Err(MailboxError::InvalidMagic {
                    expected: DEVICE_MAGIC,
                    got: magic,
                });
            }

            let max_clients = (*header).max_clients;
            let response_size = (*header).response_size;
            let layout = RegionLayout::new((*header).request_slots, max_clients, response_size);
            if region.size() < layout.total {
                return Err(MailboxError::ShmOpen {
                    name: name.to_string(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "region smaller than its layout"),
                });
            }

            let claims = base.add(layout.claims_offset) as *const AtomicU32;
            let index = (0..max_clients)
                .find(|&i| {
                    (*claims.add(i))
                        .compare_exchange(SLOT_FREE, SLOT_CLAIMED, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                })
                .ok_or(MailboxError::ClientsExhausted { max: max_clients })?;
            let client_id = index as u32 + 1;

            let queue = base.add(layout.queue_offset) as *const MpscQueueHeader;
            let (seq_header, data) = layout.response_slot(base, index);

            let mut client = Self {
                header,
                claim: claims.add(index),
                requests: MpscProducer::from_raw(queue, client_id),
                response: SeqLockReader::from_raw(seq_header, data),
                client_id,
                entry_size: (*header).entry_size,
                max_read_len: max_read_len(response_size),
                timeout,
                position: 0,
                frame: vec![0u8; response_size - 8],
                region,
            };

            // Dropping on failure releases the claim
            client.call(Request::Open)?;
            debug!(device = name, client_id, "connected");
            Ok(client)
        }
    }

    /// This handle's client slot id
    #[inline]
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Name of the device
    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Largest chunk a single read can return
    #[inline]
    pub fn max_read_len(&self) -> usize {
        self.max_read_len
    }

    /// Write one payload. Writes are all-or-nothing.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        if payload.len() > MAX_WRITE_PAYLOAD {
            return Err(MailboxError::InvalidArgument {
                max: self.entry_size,
                got: payload.len(),
            });
        }

        let (status, _) = self.call(Request::Write(payload))?;
        if status < 0 {
            return Err(MailboxError::from_status(status, payload.len(), self.entry_size));
        }
        Ok(status as usize)
    }

    /// Read up to `max_len` bytes of this handle's view at `offset`
    pub fn read(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        let max_len = max_len.min(self.max_read_len) as u32;
        let (status, payload) = self.call(Request::Read { offset, max_len })?;
        if status < 0 {
            return Err(MailboxError::from_status(status, 0, self.entry_size));
        }
        if payload.len() != status as usize {
            return Err(MailboxError::TransferFault("response length mismatch"));
        }
        Ok(payload)
    }

    /// Read into `buf`; returns the number of bytes copied
    pub fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.read(offset, buf.len())?;
        let dst = buf
            .get_mut(..bytes.len())
            .ok_or(MailboxError::TransferFault("response larger than destination"))?;
        dst.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Drain the whole current view, starting at offset 0
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(out.len() as u64, self.max_read_len)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Reset the `io::Read` cursor to the start of the view
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Ask the daemon to stop serving
    pub fn shutdown_server(mut self) -> Result<()> {
        self.call(Request::Shutdown)?;
        Ok(())
    }

    /// Send a request and wait for its response: `(status, payload)`
    fn call(&mut self, request: Request<'_>) -> Result<(i32, Vec<u8>)> {
        let request_id = unsafe { (*self.header).next_request_id.fetch_add(1, Ordering::AcqRel) };

        let mut buf = [0u8; MAX_REQUEST_SIZE];
        let len = RequestFrame::new(request_id, request)
            .encode(&mut buf)
            .ok_or(MailboxError::InvalidArgument {
                max: MAX_WRITE_PAYLOAD,
                got: MAX_WRITE_PAYLOAD + 1,
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match self.requests.try_push(&buf[..len]) {
                Ok(()) => break,
                Err(MailboxError::QueueFull) if Instant::now() < deadline => thread::yield_now(),
                Err(MailboxError::QueueFull) => return Err(MailboxError::Timeout { request_id }),
                Err(e) => return Err(e),
            }
        }

        let mut spins = 0u32;
        loop {
            if let Some(frame_len) = self.response.try_read_frame(&mut self.frame) {
                let frame = &self.frame[..frame_len.min(self.frame.len())];
                if let Some((header, payload)) = ResponseHeader::parse(frame) {
                    if header.request_id == request_id {
                        return Ok((header.status, payload.to_vec()));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(MailboxError::Timeout { request_id });
            }

            spins += 1;
            if spins % IDLE_SPINS == 0 {
                thread::yield_now();
            } else {
                core::hint::spin_loop();
            }
        }
    }
}

impl io::Read for DeviceClient {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_into(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl io::Write for DeviceClient {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(DeviceClient::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        // Best effort; the daemon may already be gone
        let mut buf = [0u8; MAX_REQUEST_SIZE];
        let request_id = unsafe { (*self.header).next_request_id.fetch_add(1, Ordering::AcqRel) };
        if let Some(len) = RequestFrame::new(request_id, Request::Close).encode(&mut buf) {
            let _ = self.requests.try_push(&buf[..len]);
        }

        unsafe {
            (*self.claim).store(SLOT_FREE, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn spawn_server(name: &str, config: DeviceConfig) -> thread::JoinHandle<()> {
        let server = DeviceServer::create(name, config, MailboxService::new()).unwrap();
        thread::spawn(move || server.run())
    }

    #[test]
    fn test_device_read_write() {
        let name = "test_device_rw";
        let handle = spawn_server(name, DeviceConfig::default());

        let mut client = DeviceClient::connect(name).unwrap();
        assert_eq!(client.client_id(), 1);

        assert_eq!(client.write(b"hello").unwrap(), 5);
        assert_eq!(client.write(b"world").unwrap(), 5);
        assert_eq!(client.read(0, 4096).unwrap(), b"helloworld");

        client.write(b"LAST").unwrap();
        assert_eq!(client.read(0, 4096).unwrap(), b"world\n");

        assert!(matches!(
            client.write(&[b'x'; 129]),
            Err(MailboxError::InvalidArgument { max: 128, got: 129 })
        ));
        assert!(matches!(
            client.write(&[b'x'; 1000]),
            Err(MailboxError::InvalidArgument { got: 1000, .. })
        ));

        client.write(b"CLEAR").unwrap();
        assert!(client.read(0, 4096).unwrap().is_empty());

        client.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_device_io_traits_and_drain() {
        let name = "test_device_io";
        let handle = spawn_server(name, DeviceConfig::default());

        let mut writer = DeviceClient::connect(name).unwrap();
        let mut reader = DeviceClient::connect(name).unwrap();
        assert_ne!(writer.client_id(), reader.client_id());

        for line in ["one\n", "two\n", "three\n"] {
            writer.write_all(line.as_bytes()).unwrap();
        }

        let mut small = [0u8; 5];
        assert_eq!(Read::read(&mut reader, &mut small).unwrap(), 5);
        assert_eq!(&small, b"one\nt");

        // The reader keeps draining its pinned view
        writer.write_all(b"CLEAR").unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "wo\nthree\n");

        reader.rewind();
        assert!(reader.read_to_end().unwrap().is_empty());

        drop(reader);
        writer.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_last_mode_is_per_client() {
        let name = "test_device_last";
        let handle = spawn_server(name, DeviceConfig::default());

        let mut a = DeviceClient::connect(name).unwrap();
        let mut b = DeviceClient::connect(name).unwrap();
        a.write(b"first").unwrap();
        a.write(b"second").unwrap();

        a.write(b"LAST").unwrap();
        assert_eq!(b.read_to_end().unwrap(), b"firstsecond");
        assert_eq!(a.read_to_end().unwrap(), b"second\n");
        assert_eq!(a.read_to_end().unwrap(), b"firstsecond");

        drop(b);
        a.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_client_slots_are_reused() {
        let name = "test_device_slots";
        let config = DeviceConfig {
            max_clients: 1,
            ..DeviceConfig::default()
        };
        let handle = spawn_server(name, config);

        let first = DeviceClient::connect(name).unwrap();
        assert!(matches!(
            DeviceClient::connect(name),
            Err(MailboxError::ClientsExhausted { max: 1 })
        ));
        drop(first);

        let second = DeviceClient::connect(name).unwrap();
        assert_eq!(second.client_id(), 1);
        second.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_second_daemon_cannot_take_over_live_device() {
        let name = "test_device_second_daemon";
        let handle = spawn_server(name, DeviceConfig::default());

        let mut client = DeviceClient::connect(name).unwrap();
        client.write(b"kept").unwrap();

        match DeviceServer::create(name, DeviceConfig::default(), MailboxService::new()) {
            Err(MailboxError::ShmCreate { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second daemon created a live device"),
        }

        // The first daemon still serves old and new clients
        assert_eq!(client.read_to_end().unwrap(), b"kept");
        let late = DeviceClient::connect(name).unwrap();
        drop(late);

        client.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_region_of_dead_daemon_is_reclaimed() {
        let name = "test_device_stale";
        let stale = SharedRegion::create(name, 4096).unwrap();
        unsafe {
            (stale.as_ptr() as *mut DeviceHeader).write(DeviceHeader {
                magic: DEVICE_MAGIC,
                version: DEVICE_VERSION,
                // Above any pid_max, so never a live process
                owner_pid: i32::MAX as u32,
                _reserved: 0,
                request_slots: 1,
                max_clients: 1,
                response_size: MIN_RESPONSE_SIZE,
                entry_size: 128,
                next_request_id: AtomicU64::new(1),
            });
        }
        // Leave the region behind the way a crashed daemon would
        std::mem::forget(stale);

        let handle = spawn_server(name, DeviceConfig::default());
        let mut client = DeviceClient::connect(name).unwrap();
        client.write(b"fresh").unwrap();
        assert_eq!(client.read_to_end().unwrap(), b"fresh");

        client.shutdown_server().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_foreign_region_is_not_reclaimed() {
        let name = "test_device_foreign";
        let foreign = SharedRegion::create(name, 4096).unwrap();

        assert!(matches!(
            DeviceServer::create(name, DeviceConfig::default(), MailboxService::new()),
            Err(MailboxError::ShmCreate { .. })
        ));
        assert!(SharedRegion::open(name).is_ok());
        drop(foreign);
    }

    #[test]
    fn test_connect_times_out_without_daemon_loop() {
        let name = "test_device_timeout";
        let server =
            DeviceServer::create(name, DeviceConfig::default(), MailboxService::new()).unwrap();

        let err = DeviceClient::connect_with_timeout(name, Duration::from_millis(50)).err();
        assert!(matches!(err, Some(MailboxError::Timeout { .. })));

        drop(server);
        assert!(matches!(
            DeviceClient::connect(name),
            Err(MailboxError::ShmOpen { .. })
        ));
    }
}
