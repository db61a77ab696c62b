//! Capture Console - one triggered logic capture, then NEC remote logging
//!
//! Samples GPIO 2..=5 once GPIO 2 goes high and prints the first samples of each
//! pin. Afterwards an IR receiver on GPIO 15 is decoded and every button press is
//! logged to the console.

#![no_std]
#![no_main]
#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::convert::Infallible;

use defmt::info;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::peripherals::PIO0;
use heapless::String;
use panic_probe as _;
use pio_scope::pio_irqs::PIO0_NEC_NOTIFIER;
use pio_scope::rp::{PioBus, rp_resources, spawn_nec_event_log};
use pio_scope::{
    CAPTURE_BUFFER_WORDS, ClockDivider, Polarity, Result, SamplePeriod, Trigger,
};
use static_cell::StaticCell;

/// Samples printed per pin.
const PREVIEW_SAMPLES: usize = 64;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) -> ! {
    let Err(err) = inner_main(spawner).await;
    core::panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Infallible> {
    info!("Starting Capture Console");
    let p = embassy_rp::init(Default::default());

    static PIO0_BUS: StaticCell<PioBus<'static, PIO0>> = StaticCell::new();
    let mut resources = rp_resources(p.PIO0, &PIO0_BUS, [p.DMA_CH0.into()]);
    let platform = resources.platform_mut();
    platform.wire_pin(p.PIN_2)?;
    platform.wire_pin(p.PIN_3)?;
    platform.wire_pin(p.PIN_4)?;
    platform.wire_pin(p.PIN_5)?;
    platform.wire_pin(p.PIN_15)?;

    // 1 µs per sample
    let divider = ClockDivider::from_period(
        embassy_rp::clocks::clk_sys_freq(),
        SamplePeriod::Micros(1),
    );
    let mut session = resources.configure_capture(2, 4, divider)?;
    let mut buffer = [0_u32; CAPTURE_BUFFER_WORDS];
    info!("Waiting for GPIO 2 to go high");
    let capture = resources
        .run_capture(&mut session, &mut buffer, Trigger::new(2, Polarity::High)?)
        .await?;

    info!(
        "Captured {} words, {} ns per sample",
        capture.words().len(),
        capture.seconds_per_sample() * 1e9
    );
    for bits in capture.bit_planes().iter() {
        let pin = bits.pin();
        let mut line: String<PREVIEW_SAMPLES> = String::new();
        for bit in bits.take(PREVIEW_SAMPLES) {
            // Capacity matches the number of pushed characters.
            let _ = line.push(if bit { '1' } else { '0' });
        }
        info!("GPIO {}: {}", pin + 2, line.as_str());
    }

    let mut decoder = resources.init_decoder(15)?;
    spawn_nec_event_log(spawner, &PIO0_NEC_NOTIFIER)?;
    resources.set_notifications(&mut decoder, &PIO0_NEC_NOTIFIER, true)?;
    info!("Listening for NEC frames on GPIO 15");

    core::future::pending().await
}
