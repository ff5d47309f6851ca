use core::panic::PanicInfo;

/// Logs the panic over RTT, then traps so a debugger halts at the fault.
#[panic_handler]
fn on_panic(info: &PanicInfo) -> ! {
    defmt::error!("presence firmware panic: {}", defmt::Display2Format(info));
    cortex_m::asm::udf();
}
