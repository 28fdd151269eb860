//! STM32G0 bindings for the `node-core` traits.
//!
//! Pin map (STM32G0B1KE):
//!
//! | Signal          | Pin   | Peripheral |
//! |-----------------|-------|------------|
//! | Radio TX / RX   | PA9 / PA10 | USART1 |
//! | Sensor TX / RX  | PA2 / PA3  | USART2 (framed-serial builds) |
//! | Trigger / Echo  | PA0 / PA1  | GPIO (pulse-timing builds) |
//! | Radio power     | PB0   | GPIO, active high |
//! | Sensor power    | PB1   | GPIO, active high |

use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Delay, Instant};
use node_core::WakeSource;
use node_core::sensor::MicrosClock;
use static_cell::StaticCell;

use crate::deployment::{LINK_BAUD, LINK_RX_BUFFER, NODE_CONFIG, RADIO_TX_BUFFER};

#[cfg(feature = "pulse-sensor")]
use embassy_stm32::gpio::{Input, Pull};
#[cfg(feature = "pulse-sensor")]
use node_core::sensor::TimedPulseSensor;
#[cfg(feature = "serial-sensor")]
use node_core::sensor::FramedSerialSensor;

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART1>;
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

static RADIO_TX: StaticCell<[u8; RADIO_TX_BUFFER]> = StaticCell::new();
static RADIO_RX: StaticCell<[u8; LINK_RX_BUFFER]> = StaticCell::new();
#[cfg(feature = "serial-sensor")]
static SENSOR_TX: StaticCell<[u8; LINK_RX_BUFFER]> = StaticCell::new();
#[cfg(feature = "serial-sensor")]
static SENSOR_RX: StaticCell<[u8; LINK_RX_BUFFER]> = StaticCell::new();

#[cfg(feature = "pulse-sensor")]
pub type Sensor = TimedPulseSensor<Output<'static>, Input<'static>, Delay, EmbassyClock>;

#[cfg(feature = "serial-sensor")]
pub type Sensor = FramedSerialSensor<BufferedUart<'static>, Delay>;

/// Power outputs in gate order: radio, sensor.
pub type Rails = [Output<'static>; 2];

/// Board resources handed to the telemetry node.
pub struct Board {
    pub sensor: Sensor,
    pub rails: Rails,
    pub radio: BufferedUart<'static>,
}

impl Board {
    /// Configures every pin and UART used by the node.
    pub fn new(p: hal::Peripherals) -> Self {
        let rails = [
            Output::new(p.PB0, Level::Low, Speed::Low),
            Output::new(p.PB1, Level::Low, Speed::Low),
        ];

        let radio = BufferedUart::new(
            p.USART1,
            p.PA10,
            p.PA9,
            RADIO_TX.init([0; RADIO_TX_BUFFER]),
            RADIO_RX.init([0; LINK_RX_BUFFER]),
            UartIrqs,
            link_config(),
        )
        .expect("failed to initialize radio UART");

        #[cfg(feature = "pulse-sensor")]
        let sensor = TimedPulseSensor::new(
            Output::new(p.PA0, Level::Low, Speed::Low),
            Input::new(p.PA1, Pull::Down),
            Delay,
            EmbassyClock,
            NODE_CONFIG.sensor.echo,
            NODE_CONFIG.tank_height,
        );

        #[cfg(feature = "serial-sensor")]
        let sensor = FramedSerialSensor::new(
            BufferedUart::new(
                p.USART2,
                p.PA3,
                p.PA2,
                SENSOR_TX.init([0; LINK_RX_BUFFER]),
                SENSOR_RX.init([0; LINK_RX_BUFFER]),
                UartIrqs,
                link_config(),
            )
            .expect("failed to initialize sensor UART"),
            Delay,
            &NODE_CONFIG.sensor,
            NODE_CONFIG.tank_height,
        );

        Self {
            sensor,
            rails,
            radio,
        }
    }
}

fn link_config() -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;
    config
}

/// Microsecond clock backed by the embassy time driver.
pub struct EmbassyClock;

impl MicrosClock for EmbassyClock {
    fn now_micros(&mut self) -> u64 {
        Instant::now().as_micros()
    }
}

/// Sleep-mode wait: `WFI` entered with interrupts masked.
///
/// A masked interrupt still wakes the core from `WFI`; it is serviced as soon
/// as the critical section ends, so a tick that lands between the `pending`
/// check and the sleep instruction ends the sleep immediately.
pub struct WfiWake;

impl WakeSource for WfiWake {
    fn sleep_until_interrupt<F>(&mut self, pending: F)
    where
        F: Fn() -> bool,
    {
        critical_section::with(|_| {
            if !pending() {
                cortex_m::asm::wfi();
            }
        });
    }
}
