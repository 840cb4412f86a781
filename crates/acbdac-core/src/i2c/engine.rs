//! I2C master transactions over an MPSSE link
//!
//! The engine owns the single physical link behind a non-reentrant lock.
//! A [`BusGuard`] is the held lock: every wire operation goes through one,
//! and dropping it releases the link on every exit path.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::link::{BitMode, MpsseLink};

use super::mpsse;

/// Lowest non-reserved 7-bit address
pub const SCAN_FIRST: u8 = 0x08;

/// Highest non-reserved 7-bit address
pub const SCAN_LAST: u8 = 0x77;

/// Transfer direction encoded in the address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Master to target (R/W bit 0)
    Write,
    /// Target to master (R/W bit 1)
    Read,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Write => write!(f, "write"),
            Direction::Read => write!(f, "read"),
        }
    }
}

impl Direction {
    fn address_byte(&self, address: u8) -> u8 {
        match self {
            Direction::Write => address << 1,
            Direction::Read => (address << 1) | 0x01,
        }
    }
}

/// Bus state as tracked by the engine
///
/// The link itself is stateless, so this is the only record of where the
/// bus is between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusState {
    /// Both lines released
    #[default]
    Idle,
    /// START issued
    Started,
    /// Address byte acknowledged
    AddressSent(Direction),
    /// Payload bytes are moving
    DataPhase,
    /// Transaction finished without STOP; the next START is a repeated start
    Held,
}

/// Whether to end a transaction with STOP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopCondition {
    /// Issue STOP (normal)
    #[default]
    Send,
    /// Keep the bus for a repeated-start follow-up
    Suppress,
}

/// Timing parameters for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// SCL frequency in Hz
    pub frequency_hz: u32,
    /// Deadline for each read from the bridge
    pub read_timeout: Duration,
    /// Sleep between empty polls of the link
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 100_000,
            read_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_micros(100),
        }
    }
}

/// The caller's side of a transfer, for error reporting
#[derive(Debug, Clone, Copy)]
struct Request {
    address: u8,
    op: Direction,
    /// Bytes the caller asked to read (0 for writes)
    len: usize,
}

impl Request {
    fn timed_out(&self, received: usize) -> Error {
        Error::ReadTimeout {
            address: self.address,
            op: self.op,
            requested: self.len,
            received,
        }
    }
}

/// State that lives with the physical link
struct LinkState<L> {
    link: L,
    bus: BusState,
    /// Multiplexer port last connected, if known
    selected_port: Option<u8>,
    /// Replies may be queued out of step; purge and resync before the next START
    dirty: bool,
}

/// I2C master over an MPSSE bridge
pub struct I2cEngine<L: MpsseLink> {
    inner: Mutex<LinkState<L>>,
    settings: EngineSettings,
    transactions: AtomicUsize,
}

impl<L: MpsseLink> I2cEngine<L> {
    /// Bring up the bridge as an I2C master and take ownership of the link
    pub fn new(mut link: L, settings: EngineSettings) -> Result<Self> {
        log::debug!(
            "Initializing MPSSE I2C master at {} Hz",
            settings.frequency_hz
        );

        link.reset()?;
        link.set_bitmode(0x00, BitMode::Reset)?;
        link.set_bitmode(0x00, BitMode::Mpsse)?;

        let engine = Self {
            inner: Mutex::new(LinkState {
                link,
                bus: BusState::Idle,
                selected_port: None,
                dirty: false,
            }),
            settings,
            transactions: AtomicUsize::new(0),
        };

        {
            let mut bus = engine.try_acquire()?;
            bus.sync()?;
            let mut buf = Vec::with_capacity(16);
            mpsse::push_init(&mut buf, mpsse::divisor_for(engine.settings.frequency_hz));
            bus.send(&buf)?;
        }

        log::info!(
            "MPSSE I2C master ready ({} Hz, read timeout {:?})",
            engine.settings.frequency_hz,
            engine.settings.read_timeout
        );
        Ok(engine)
    }

    /// Try to take the transaction lock
    ///
    /// Fails with [`Error::LockContention`] if it is already held, including
    /// by the calling thread. Never blocks.
    pub fn try_acquire(&self) -> Result<BusGuard<'_, L>> {
        let state = match self.inner.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return Err(Error::LockContention),
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!("I2C lock poisoned by a panicked holder, resetting bus state");
                let mut state = poisoned.into_inner();
                state.bus = BusState::Idle;
                state.selected_port = None;
                state.dirty = true;
                state
            }
        };
        Ok(BusGuard {
            state,
            settings: &self.settings,
            transactions: &self.transactions,
        })
    }

    /// Write `data` to `address` and STOP
    pub fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        self.try_acquire()?.write(address, data)
    }

    /// Fill `buf` from `address` and STOP
    pub fn read_into(&self, address: u8, buf: &mut [u8]) -> Result<()> {
        self.try_acquire()?.read_into(address, buf)
    }

    /// Write then read with a repeated start in between
    pub fn write_read(&self, address: u8, data: &[u8], buf: &mut [u8]) -> Result<()> {
        self.try_acquire()?.write_read(address, data, buf)
    }

    /// Addresses in 0x08-0x77 that acknowledge a zero-length write
    pub fn scan(&self) -> Result<Vec<u8>> {
        self.try_acquire()?.scan()
    }

    /// Number of framed transactions issued so far
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::Relaxed)
    }

    /// Timing parameters in effect
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Release the pins and hand the link back
    pub fn into_link(self) -> L {
        let mut state = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut buf = Vec::with_capacity(3);
        mpsse::push_idle(&mut buf);
        if let Err(e) = state.link.write(&buf) {
            log::warn!("Failed to idle I2C pins on close: {}", e);
        }
        state.link
    }
}

/// Exclusive access to the link for one logical operation
pub struct BusGuard<'a, L: MpsseLink> {
    state: MutexGuard<'a, LinkState<L>>,
    settings: &'a EngineSettings,
    transactions: &'a AtomicUsize,
}

impl<L: MpsseLink> BusGuard<'_, L> {
    /// Current bus state
    pub fn state(&self) -> BusState {
        self.state.bus
    }

    /// Multiplexer port last connected on this link, if known
    pub fn selected_port(&self) -> Option<u8> {
        self.state.selected_port
    }

    pub(crate) fn set_selected_port(&mut self, port: Option<u8>) {
        self.state.selected_port = port;
    }

    /// Release the lock explicitly
    pub fn release(self) {}

    /// Write `data` to `address` and STOP
    pub fn write(&mut self, address: u8, data: &[u8]) -> Result<()> {
        self.write_with(address, data, StopCondition::Send)
    }

    /// Write `data` to `address`
    ///
    /// On failure the bus is always released with STOP, whatever `stop` says.
    pub fn write_with(&mut self, address: u8, data: &[u8], stop: StopCondition) -> Result<()> {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        let result = self.write_phase(address, data);
        self.finish(result, stop)
    }

    /// Fill `buf` from `address` and STOP
    pub fn read_into(&mut self, address: u8, buf: &mut [u8]) -> Result<()> {
        self.read_into_with(address, buf, StopCondition::Send)
    }

    /// Fill `buf` from `address`
    ///
    /// All or nothing: `buf` is only touched once every byte has arrived.
    pub fn read_into_with(
        &mut self,
        address: u8,
        buf: &mut [u8],
        stop: StopCondition,
    ) -> Result<()> {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        let result = self.read_phase(address, buf.len());
        let data = self.finish(result, stop)?;
        buf.copy_from_slice(&data);
        Ok(())
    }

    /// Write then read with a repeated start in between
    pub fn write_read(&mut self, address: u8, data: &[u8], buf: &mut [u8]) -> Result<()> {
        self.write_with(address, data, StopCondition::Suppress)?;
        self.read_into(address, buf)
    }

    /// Whether `address` acknowledges a zero-length write
    pub fn probe(&mut self, address: u8) -> Result<bool> {
        match self.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(Error::NoAck { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Addresses in 0x08-0x77 that acknowledge a zero-length write
    pub fn scan(&mut self) -> Result<Vec<u8>> {
        self.scan_range(SCAN_FIRST..=SCAN_LAST)
    }

    /// Addresses in `range` that acknowledge a zero-length write
    ///
    /// Reserved addresses outside 0x08-0x77 are skipped.
    pub fn scan_range(&mut self, range: RangeInclusive<u8>) -> Result<Vec<u8>> {
        let mut found = Vec::new();
        for address in range {
            if !(SCAN_FIRST..=SCAN_LAST).contains(&address) {
                continue;
            }
            if self.probe(address)? {
                log::debug!("Found I2C target at 0x{:02X}", address);
                found.push(address);
            }
        }
        Ok(found)
    }

    // ------------------------------------------------------------------------
    // Transaction phases
    // ------------------------------------------------------------------------

    fn write_phase(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let request = Request {
            address,
            op: Direction::Write,
            len: 0,
        };
        self.start()?;
        self.address(request)?;
        self.state.bus = BusState::DataPhase;
        for (written, &byte) in data.iter().enumerate() {
            if !self.write_byte(byte, request)? {
                return Err(Error::DataNack { address, written });
            }
        }
        Ok(())
    }

    fn read_phase(&mut self, address: u8, len: usize) -> Result<Vec<u8>> {
        let request = Request {
            address,
            op: Direction::Read,
            len,
        };
        self.start()?;
        self.address(request)?;
        self.state.bus = BusState::DataPhase;

        let mut data = vec![0u8; len];
        if len == 0 {
            return Ok(data);
        }

        let chunk_len = self.state.link.max_transfer().max(1);
        let deadline = Instant::now() + self.settings.read_timeout;
        let mut cmd = Vec::with_capacity(chunk_len * 12 + 4);
        mpsse::push_release_sda(&mut cmd);

        let mut received = 0;
        for chunk in data.chunks_mut(chunk_len) {
            for i in 0..chunk.len() {
                let last = received + i + 1 == len;
                mpsse::push_read_byte(&mut cmd, last);
            }
            mpsse::push_flush(&mut cmd);
            self.send(&cmd)?;
            cmd.clear();

            let got = self.accumulate(chunk, deadline)?;
            if got < chunk.len() {
                return Err(request.timed_out(received + got));
            }
            received += got;
        }

        log::trace!("Read {} byte(s) from 0x{:02X}", len, address);
        Ok(data)
    }

    fn start(&mut self) -> Result<()> {
        if self.state.dirty {
            self.resync()?;
        }
        let mut buf = Vec::with_capacity(48);
        if self.state.bus == BusState::Held {
            mpsse::push_repeated_start(&mut buf);
        } else {
            mpsse::push_start(&mut buf);
        }
        self.send(&buf)?;
        self.state.bus = BusState::Started;
        Ok(())
    }

    fn address(&mut self, request: Request) -> Result<()> {
        let byte = request.op.address_byte(request.address);
        if !self.write_byte(byte, request)? {
            return Err(Error::NoAck {
                address: request.address,
            });
        }
        self.state.bus = BusState::AddressSent(request.op);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut buf = Vec::with_capacity(36);
        mpsse::push_stop(&mut buf);
        self.send(&buf)?;
        self.state.bus = BusState::Idle;
        Ok(())
    }

    /// STOP unless suppressed; errors always STOP
    fn finish<T>(&mut self, result: Result<T>, stop: StopCondition) -> Result<T> {
        match (&result, stop) {
            (Ok(_), StopCondition::Suppress) => {
                self.state.bus = BusState::Held;
                result
            }
            (Ok(_), StopCondition::Send) => {
                self.stop()?;
                result
            }
            (Err(e), _) => {
                if let Err(stop_err) = self.stop() {
                    log::warn!("Failed to release bus after '{}': {}", e, stop_err);
                    self.state.bus = BusState::Idle;
                }
                result
            }
        }
    }

    /// Shift one byte out, returning whether it was acknowledged
    ///
    /// A missing ACK sample is reported against `request`: no caller byte
    /// has been received at that point.
    fn write_byte(&mut self, byte: u8, request: Request) -> Result<bool> {
        let mut cmd = Vec::with_capacity(16);
        mpsse::push_write_byte(&mut cmd, byte);
        self.send(&cmd)?;

        let mut reply = [0u8; 1];
        let deadline = Instant::now() + self.settings.read_timeout;
        if self.accumulate(&mut reply, deadline)? == 0 {
            return Err(request.timed_out(0));
        }
        Ok(!mpsse::is_nack(reply[0]))
    }

    /// Confirm the MPSSE engine is in step by provoking a bad-command echo
    fn sync(&mut self) -> Result<()> {
        self.send(&[mpsse::SYNC_PROBE])?;
        let mut reply = [0u8; 2];
        let deadline = Instant::now() + self.settings.read_timeout;
        let got = self.accumulate(&mut reply, deadline)?;
        if got < reply.len() {
            return Err(Error::Link(format!(
                "MPSSE sync timed out: {} of {} byte(s) echoed",
                got,
                reply.len()
            )));
        }
        if reply[0] == mpsse::BAD_COMMAND && reply[1] != mpsse::SYNC_PROBE {
            // Something earlier in the stream was rejected
            return Err(Error::BadCommand(reply[1]));
        }
        if reply != [mpsse::BAD_COMMAND, mpsse::SYNC_PROBE] {
            return Err(Error::Link(format!(
                "MPSSE sync failed: expected FA {:02X}, got {:02X} {:02X}",
                mpsse::SYNC_PROBE,
                reply[0],
                reply[1]
            )));
        }
        Ok(())
    }

    /// Throw away stale replies and confirm the bridge is in step again
    fn resync(&mut self) -> Result<()> {
        log::debug!("Resynchronizing MPSSE link");
        self.state.link.purge_rx()?;
        self.sync()?;
        self.state.dirty = false;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        if let Err(e) = self.state.link.write(data) {
            self.state.dirty = true;
            return Err(e);
        }
        log::trace!("MPSSE tx {} byte(s)", data.len());
        Ok(())
    }

    /// Fill `buf` from the link, polling until `deadline`
    ///
    /// Returns the number of bytes received, which is short of `buf.len()`
    /// only when the deadline passed. The link is then marked for resync.
    fn accumulate(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.state.link.read(&mut buf[total..])?;
            if n > 0 {
                total += n;
                continue;
            }
            if Instant::now() >= deadline {
                self.state.dirty = true;
                log::debug!(
                    "MPSSE read timed out with {} of {} byte(s)",
                    total,
                    buf.len()
                );
                return Ok(total);
            }
            std::thread::sleep(self.settings.poll_interval);
        }
        Ok(total)
    }
}
