use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::InterruptExecutor;
use embassy_stm32 as hal;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_time::{Delay, Duration, Instant, Ticker};
use node_core::{DutyCycleScheduler, TelemetryNode};
use static_cell::StaticCell;

use crate::deployment::{NODE_CONFIG, STRATEGY, WAKE_PERIOD_MS, telemetry_interval_ms};
use crate::hw::{Board, WfiWake};
use crate::telemetry::TelemetryRecorder;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

static SCHEDULER: StaticCell<DutyCycleScheduler> = StaticCell::new();
static WAKE_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

// Otherwise unused on this board; hosts the wake tick executor.
#[interrupt]
unsafe fn USART3_4_5_6_LPUART1() {
    unsafe { WAKE_EXECUTOR.on_interrupt() }
}

/// Periodic wake source. Runs in interrupt context and only touches the scheduler.
#[embassy_executor::task]
async fn wake_tick(scheduler: &'static DutyCycleScheduler) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(WAKE_PERIOD_MS));
    loop {
        ticker.next().await;
        scheduler.on_wake_interrupt();
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    if let Err(error) = NODE_CONFIG.validate() {
        defmt::panic!("invalid node configuration: {}", error);
    }

    let board = Board::new(hal::init(hal::Config::default()));
    let scheduler: &'static DutyCycleScheduler =
        SCHEDULER.init(DutyCycleScheduler::new(NODE_CONFIG.max_sleep_rounds));

    let mut node = match TelemetryNode::from_config(
        NODE_CONFIG,
        board.sensor,
        board.rails,
        Delay,
        board.radio,
        Delay,
    ) {
        Ok(node) => node,
        Err(error) => defmt::panic!("invalid node configuration: {}", error),
    };
    if let Err(fault) = node.start() {
        defmt::warn!("power: rail {} did not reach its idle level", fault.rail);
    }

    interrupt::USART3_4_5_6_LPUART1.set_priority(Priority::P2);
    let spawner = WAKE_EXECUTOR.start(interrupt::USART3_4_5_6_LPUART1);
    spawner
        .spawn(wake_tick(scheduler))
        .expect("failed to spawn wake tick task");

    defmt::info!(
        "tank-node: id={} strategy={} interval={}ms",
        NODE_CONFIG.sensor_id,
        STRATEGY,
        telemetry_interval_ms(&NODE_CONFIG)
    );

    let mut recorder = TelemetryRecorder::new();
    node.run(scheduler, &mut WfiWake, |report| {
        recorder.record_window(report, Instant::now().as_millis());
    })
}
