/*
 * DEUK Demo Entry Point
 *
 * Thin glue around the simulation library: build a machine from the
 * default configuration (optionally overriding the scheduling policy
 * from the first process argument), run a small mixed workload, and
 * exit once the machine halts.
 */

use std::env;
use std::sync::Arc;

use anyhow::Context;

use deuk_kernel::drivers::DiskDevice;
use deuk_kernel::kernel::Kernel;
use deuk_kernel::scheduler::thread::KThread;
use deuk_kernel::sync::Semaphore;
use deuk_kernel::utils::logger;
use deuk_kernel::{MachineConfig, SchedPolicy};

fn main() -> anyhow::Result<()> {
    logger::init();

    let mut config = MachineConfig::default();
    if let Some(name) = env::args().nth(1) {
        config.policy = name
            .parse::<SchedPolicy>()
            .context("cannot start the simulation")?;
    }
    log::info!("booting with policy {}", config.policy.name());

    let kernel = Kernel::new(config);
    let stats = kernel.run(demo_workload);

    log::info!(
        "simulation complete after {} ticks ({} system, {} user, {} idle)",
        stats.total_ticks,
        stats.system_ticks,
        stats.user_ticks,
        stats.idle_ticks
    );
    Ok(())
}

/// A little of everything: competing threads, a disk round trip.
fn demo_workload(kernel: &Arc<Kernel>) {
    for name in ["alice", "bob", "carol"] {
        let worker = KThread::new(name);
        worker.fork(kernel, move |kernel| {
            for step in 0..3 {
                log::info!("{}: step {}", name, step);
                kernel.current_thread().yield_now(kernel);
            }
        });
    }

    let disk_path = env::temp_dir().join("deuk-demo-disk.img");
    let done = Arc::new(Semaphore::new("disk done", 0));
    let completion = {
        let done = done.clone();
        Arc::new(move |kernel: &Arc<Kernel>| done.v(kernel))
    };
    let disk = match DiskDevice::new(&disk_path, completion, false) {
        Ok(disk) => disk,
        Err(err) => {
            log::error!("cannot open demo disk: {}", err);
            return;
        }
    };

    let pattern = [0xA5u8; deuk_kernel::drivers::disk::SECTOR_SIZE];
    disk.write_request(kernel, 5, &pattern);
    done.p(kernel);

    let mut readback = [0u8; deuk_kernel::drivers::disk::SECTOR_SIZE];
    disk.read_request(kernel, 5, &mut readback);
    done.p(kernel);
    log::info!(
        "disk round trip {}",
        if readback == pattern { "ok" } else { "MISMATCH" }
    );
}
