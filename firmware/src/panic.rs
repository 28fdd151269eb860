//! Panic reporting over RTT, selected with the `defmt-panic` feature.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cortex_m::interrupt::disable();
    defmt::error!("tank-node panic: {}", defmt::Display2Format(info));
    cortex_m::asm::udf();
}
