/*
 * Disk Device
 *
 * Simulated single-platter disk: 32 tracks of 32 sectors of 128 bytes,
 * backed by a magic-prefixed host file. One request may be outstanding
 * at a time. The data moves synchronously inside the request call; the
 * completion interrupt arrives after the modeled latency.
 *
 * Latency is seek (per-track head movement) plus rotation (the head
 * waits for the target sector to come around) plus one rotation time to
 * transfer the sector. A track buffer, off by default, serves reads of
 * sectors the head has already swept on the current track in a single
 * rotation time.
 */

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use spin::Mutex;

use crate::config::{MachineConfig, Tick};
use crate::interrupt::pending::{InterruptHandler, InterruptKind};
use crate::kernel::Kernel;

pub const SECTOR_SIZE: usize = 128;
pub const SECTORS_PER_TRACK: u32 = 32;
pub const NUM_TRACKS: u32 = 32;
pub const NUM_SECTORS: u32 = SECTORS_PER_TRACK * NUM_TRACKS;

/// First four bytes of every backing file, big-endian.
const DISK_MAGIC: u32 = 0x4567_89AB;
const MAGIC_SIZE: u64 = 4;

struct DiskState {
    file: File,
    active: bool,
    last_sector: u32,
    /// Virtual time at which the track buffer started filling from the
    /// current track (reset whenever the head seeks).
    buffer_init: Tick,
}

struct DiskShared {
    subscriber: InterruptHandler,
    track_buffer: bool,
    state: Mutex<DiskState>,
}

pub struct DiskDevice {
    shared: Arc<DiskShared>,
}

impl DiskDevice {
    /// Open (or create zero-filled) the backing file at `path`.
    /// `subscriber` runs on every request completion, with interrupts
    /// masked. `track_buffer` enables the read fast path.
    pub fn new(
        path: &Path,
        subscriber: InterruptHandler,
        track_buffer: bool,
    ) -> io::Result<DiskDevice> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() == 0 {
            log::info!("creating disk backing store at {}", path.display());
            file.write_all(&DISK_MAGIC.to_be_bytes())?;
            // Zero-extend to full size with a single write at the end.
            file.seek(SeekFrom::Start(
                MAGIC_SIZE + u64::from(NUM_SECTORS) * SECTOR_SIZE as u64 - 1,
            ))?;
            file.write_all(&[0])?;
        } else {
            let mut magic = [0u8; MAGIC_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut magic)?;
            if u32::from_be_bytes(magic) != DISK_MAGIC {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} is not a disk backing store", path.display()),
                ));
            }
        }

        Ok(DiskDevice {
            shared: Arc::new(DiskShared {
                subscriber,
                track_buffer,
                state: Mutex::new(DiskState {
                    file,
                    active: false,
                    last_sector: 0,
                    buffer_init: 0,
                }),
            }),
        })
    }

    /// Whether a request is outstanding.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Read `sector` into `data`. The bytes are available immediately;
    /// the completion interrupt arrives after the modeled latency.
    ///
    /// # Panics
    /// Panics if a request is already outstanding, the sector is out of
    /// range, `data` is not exactly one sector, or the backing store
    /// fails.
    pub fn read_request(&self, kernel: &Arc<Kernel>, sector: u32, data: &mut [u8]) {
        assert_eq!(data.len(), SECTOR_SIZE, "disk transfers whole sectors");
        let ticks = self.begin_request(kernel, sector, false, |state| {
            state
                .file
                .read_exact(data)
                .expect("disk backing store read failed");
        });
        kernel.stats.count_disk_read();
        self.schedule_completion(kernel, ticks);
    }

    /// Write `data` to `sector`. The bytes hit the backing store
    /// immediately; the completion interrupt arrives after the modeled
    /// latency.
    ///
    /// # Panics
    /// Same conditions as `read_request`.
    pub fn write_request(&self, kernel: &Arc<Kernel>, sector: u32, data: &[u8]) {
        assert_eq!(data.len(), SECTOR_SIZE, "disk transfers whole sectors");
        let ticks = self.begin_request(kernel, sector, true, |state| {
            state
                .file
                .write_all(data)
                .expect("disk backing store write failed");
        });
        kernel.stats.count_disk_write();
        self.schedule_completion(kernel, ticks);
    }

    /// Common request path: latency computation, transfer, head state
    /// update. Returns the latency to the completion interrupt.
    fn begin_request<F>(&self, kernel: &Arc<Kernel>, sector: u32, writing: bool, transfer: F) -> Tick
    where
        F: FnOnce(&mut DiskState),
    {
        assert!(sector < NUM_SECTORS, "disk sector {} out of range", sector);
        let mut state = self.shared.state.lock();
        assert!(!state.active, "disk request issued while the disk is busy");

        let now = kernel.stats.total_ticks();
        let ticks = compute_latency(
            &kernel.config,
            now,
            state.last_sector,
            state.buffer_init,
            sector,
            writing,
            self.shared.track_buffer,
        );
        log::debug!(
            "disk {}: sector {}, latency {} ticks",
            if writing { "write" } else { "read" },
            sector,
            ticks
        );

        state
            .file
            .seek(SeekFrom::Start(
                MAGIC_SIZE + u64::from(sector) * SECTOR_SIZE as u64,
            ))
            .expect("disk backing store seek failed");
        transfer(&mut state);

        state.active = true;
        update_last(&kernel.config, now, &mut state, sector);
        ticks
    }

    fn schedule_completion(&self, kernel: &Arc<Kernel>, ticks: Tick) {
        let shared = self.shared.clone();
        kernel.interrupt.schedule(
            kernel,
            Arc::new(move |kernel: &Arc<Kernel>| {
                shared.state.lock().active = false;
                (shared.subscriber)(kernel);
            }),
            ticks,
            InterruptKind::Disk,
        );
    }
}

fn track_of(sector: u32) -> u32 {
    sector / SECTORS_PER_TRACK
}

/// Sector distance from `from` to `to` going forward around the track.
fn modulo_diff(to: u64, from: u64) -> u64 {
    let spt = u64::from(SECTORS_PER_TRACK);
    ((to % spt) + spt - (from % spt)) % spt
}

/// Head movement cost to reach `new_sector`'s track, plus the partial
/// rotation needed to land on the next sector boundary after the seek.
fn time_to_seek(config: &MachineConfig, now: Tick, last_sector: u32, new_sector: u32) -> (Tick, Tick) {
    let tracks_moved = track_of(last_sector).abs_diff(track_of(new_sector));
    let seek = Tick::from(tracks_moved) * config.seek_time;

    let mut rotation = 0;
    let over = (now + seek) % config.rotation_time;
    if over > 0 {
        rotation = config.rotation_time - over;
    }
    (seek, rotation)
}

/// Ticks until the requested transfer completes, counted from `now`.
fn compute_latency(
    config: &MachineConfig,
    now: Tick,
    last_sector: u32,
    buffer_init: Tick,
    new_sector: u32,
    writing: bool,
    track_buffer: bool,
) -> Tick {
    let (seek, mut rotation) = time_to_seek(config, now, last_sector, new_sector);
    let time_after = now + seek + rotation;

    if track_buffer && !writing && seek == 0 {
        // The head has swept past the sector since the buffer started
        // filling, so it can be served from the track buffer in one
        // transfer time.
        let swept = time_after.saturating_sub(buffer_init) / config.rotation_time;
        if swept > modulo_diff(u64::from(new_sector), buffer_init / config.rotation_time) {
            return config.rotation_time;
        }
    }

    rotation +=
        modulo_diff(u64::from(new_sector), time_after / config.rotation_time) * config.rotation_time;
    seek + rotation + config.rotation_time
}

/// Record the head position after a request; the track buffer restarts
/// only when the head actually moved.
fn update_last(config: &MachineConfig, now: Tick, state: &mut DiskState, new_sector: u32) {
    let (seek, rotation) = time_to_seek(config, now, state.last_sector, new_sector);
    if seek != 0 {
        state.buffer_init = now + seek + rotation;
    }
    state.last_sector = new_sector;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_diff_stays_in_track_range() {
        for to in 0..2 * u64::from(SECTORS_PER_TRACK) {
            for from in 0..2 * u64::from(SECTORS_PER_TRACK) {
                let d = modulo_diff(to, from);
                assert!(d < u64::from(SECTORS_PER_TRACK));
            }
        }
    }

    #[test]
    fn test_modulo_diff_wraps_forward() {
        assert_eq!(modulo_diff(3, 30), 5);
        assert_eq!(modulo_diff(30, 3), 27);
        assert_eq!(modulo_diff(7, 7), 0);
    }

    #[test]
    fn test_latency_is_bounded() {
        let config = MachineConfig::default();
        let bound = config.seek_time * Tick::from(NUM_TRACKS)
            + 2 * config.rotation_time * Tick::from(SECTORS_PER_TRACK);
        for now in [0, 17, 499, 500, 12_345] {
            for last in [0, 31, 32, 511, NUM_SECTORS - 1] {
                for new in [0, 1, 33, 500, NUM_SECTORS - 1] {
                    for writing in [false, true] {
                        let latency =
                            compute_latency(&config, now, last, 0, new, writing, false);
                        assert!(latency >= config.rotation_time);
                        assert!(
                            latency <= bound,
                            "latency {} above bound {} (last {}, new {})",
                            latency,
                            bound,
                            last,
                            new
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_same_sector_costs_a_full_revolution() {
        let config = MachineConfig::default();
        // Head on sector 0 at a rotation boundary: re-reading sector 0
        // waits a full revolution minus nothing, then transfers.
        let latency = compute_latency(&config, 0, 0, 0, 0, false, false);
        assert_eq!(latency, config.rotation_time);
    }

    #[test]
    fn test_seek_adds_per_track_cost() {
        let config = MachineConfig::default();
        let near = compute_latency(&config, 0, 0, 0, 1, false, false);
        let far = compute_latency(&config, 0, 0, 0, 1 + SECTORS_PER_TRACK * 4, false, false);
        assert!(far >= near + 4 * config.seek_time);
    }
}
