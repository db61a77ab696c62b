//! Host-level tests for the capture engine against the simulated PIO block.

use std::future::{pending, ready};
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use embassy_futures::block_on;
use embassy_time::Duration;
use pio_scope::sim::{self, SimOp};
use pio_scope::{
    CaptureConfig, CaptureState, ClockDivider, ConfigError, Error, PinCount, Polarity, Resource,
    SamplePeriod, Trigger,
};

fn divider(ratio: f32) -> ClockDivider {
    ClockDivider::new(ratio).expect("divider in range")
}

fn high_on(pin: u8) -> Trigger {
    Trigger::new(pin, Polarity::High).expect("trigger pin is a GPIO")
}

#[test]
fn four_pin_capture_splits_into_bit_planes() {
    let (mut resources, sim) = sim::resources::<2>();
    let mut session = resources
        .configure_capture(2, 4, divider(1.0))
        .expect("lane available");
    sim.feed_waveform(&[0b0001_1011, u32::MAX]);
    sim.set_level(10, true);

    let mut buffer = [0_u32; 2];
    let capture = block_on(resources.run_capture(&mut session, &mut buffer, high_on(10)))
        .expect("capture completes");

    assert_eq!(capture.words(), &[0b0001_1011, u32::MAX]);
    let planes = capture.bit_planes();
    assert_eq!(planes.bits_per_pin(), 16);
    assert_eq!(planes.pin(0).expect("pin 0").to_string(), "1100000011111111");
    assert_eq!(planes.pin(1).expect("pin 1").to_string(), "1000000011111111");
    assert_eq!(planes.pin(2).expect("pin 2").to_string(), "0000000011111111");
    assert_eq!(planes.pin(3).expect("pin 3").to_string(), "1000000011111111");
    assert!(matches!(
        planes.pin(4),
        Err(Error::InvalidConfiguration(ConfigError::PinIndex(4)))
    ));

    assert_eq!(session.state(), CaptureState::Released);
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(resources.free_channels(), 2);
    assert_eq!(sim.free_program_words(), 32);
}

#[test]
fn transfer_waits_for_the_trigger_level() {
    let (mut resources, sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");
    sim.feed_waveform(&[0xDEAD_BEEF]);

    let mut buffer = [0_u32; 1];
    {
        let mut run = pin!(resources.run_capture(
            &mut session,
            &mut buffer,
            Trigger::new(7, Polarity::Low).expect("trigger pin is a GPIO"),
        ));
        let mut cx = Context::from_waker(Waker::noop());

        sim.set_level(7, true);
        assert!(run.as_mut().poll(&mut cx).is_pending());
        assert!(run.as_mut().poll(&mut cx).is_pending());

        sim.set_level(7, false);
        let Poll::Ready(result) = run.as_mut().poll(&mut cx) else {
            panic!("capture should finish once GPIO 7 reads low");
        };
        assert_eq!(result.expect("capture completes").words(), &[0xDEAD_BEEF]);
    }
    assert_eq!(session.state(), CaptureState::Released);
}

#[test]
fn run_capture_orders_hardware_operations() {
    let (mut resources, sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(4, 2, divider(3.0))
        .expect("lane available");
    let lane = session.lane().expect("lane held");
    let trigger = high_on(4);
    sim.set_level(4, true);

    let config = *session.config().expect("configured");
    assert_eq!(
        sim.ops(lane),
        [
            SimOp::Configured(config),
            SimOp::Enabled(true),
            SimOp::GateReleased
        ]
    );
    sim.clear_events();

    let mut buffer = [0_u32; 3];
    block_on(resources.run_capture(&mut session, &mut buffer, trigger)).expect("capture completes");

    assert_eq!(
        sim.ops(lane),
        [
            SimOp::Restarted(30),
            SimOp::WaitInjected(trigger),
            SimOp::Enabled(true),
            SimOp::TransferStarted {
                channel: 0,
                words: 3
            },
            SimOp::GateReleased,
            SimOp::TransferComplete,
            SimOp::Enabled(false),
        ]
    );
}

#[test]
fn exhausting_lanes_claims_nothing() {
    let (mut resources, sim) = sim::resources::<1>();
    let sessions: Vec<_> = (0..4)
        .map(|pin| {
            resources
                .configure_capture(pin, 1, divider(1.0))
                .expect("lane available")
        })
        .collect();
    assert_eq!(resources.free_lanes(), 0);
    let words_before = sim.free_program_words();

    assert!(matches!(
        resources.configure_capture(8, 1, divider(1.0)),
        Err(Error::ResourceExhausted(Resource::SamplingLane))
    ));
    assert_eq!(sim.free_program_words(), words_before);

    for session in sessions {
        resources.release_capture(session).expect("slot was empty");
    }
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);
}

#[test]
fn invalid_configuration_is_rejected_before_claiming() {
    let (mut resources, sim) = sim::resources::<1>();

    assert!(matches!(
        resources.configure_capture(0, 3, divider(1.0)),
        Err(Error::InvalidConfiguration(ConfigError::PinCount))
    ));
    assert!(matches!(
        resources.configure_capture(29, 4, divider(1.0)),
        Err(Error::InvalidConfiguration(ConfigError::PinOutOfRange(29)))
    ));
    assert!(matches!(
        resources.configure_capture(
            0,
            1,
            ClockDivider::from_period(125_000_000, SamplePeriod::Micros(1_000_000))
        ),
        Err(Error::InvalidConfiguration(ConfigError::DividerOutOfRange))
    ));

    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);
    assert!(sim.events().is_empty());
}

#[test]
fn unwired_pin_unwinds_program_and_lane() {
    let (mut resources, sim) = sim::resources::<1>();
    sim.set_wired_pins(!(1 << 3));

    assert!(matches!(
        resources.configure_capture(2, 4, divider(1.0)),
        Err(Error::InvalidConfiguration(ConfigError::PinUnavailable(3)))
    ));
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);
}

#[test]
fn missing_transfer_channel_releases_the_session() {
    let (mut resources, sim) = sim::resources::<0>();
    let mut session = resources
        .configure_capture(0, 8, divider(1.0))
        .expect("lane available");

    let mut buffer = [0_u32; 4];
    assert!(matches!(
        block_on(resources.run_capture(&mut session, &mut buffer, high_on(0))),
        Err(Error::ResourceExhausted(Resource::TransferChannel))
    ));
    assert_eq!(session.state(), CaptureState::Released);
    assert_eq!(session.lane(), None);
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);

    assert!(matches!(
        block_on(resources.run_capture(&mut session, &mut buffer, high_on(0))),
        Err(Error::InvalidConfiguration(ConfigError::SessionReleased))
    ));
}

#[test]
fn empty_buffer_leaves_the_session_untouched() {
    let (mut resources, _sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");

    assert!(matches!(
        block_on(resources.run_capture(&mut session, &mut [], high_on(0))),
        Err(Error::InvalidConfiguration(ConfigError::EmptyBuffer))
    ));
    assert_eq!(session.state(), CaptureState::Configuring);
    assert_eq!(resources.free_channels(), 1);
    resources.release_capture(session).expect("slot was empty");
}

#[test]
fn cancelled_capture_returns_every_claim() {
    let (mut resources, sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");
    let lane = session.lane().expect("lane held");

    let mut buffer = [0_u32; 4];
    let result = block_on(resources.run_capture_until(
        &mut session,
        &mut buffer,
        high_on(5),
        ready(()),
    ));

    assert!(matches!(result, Err(Error::HardwareTimeout)));
    assert_eq!(session.state(), CaptureState::Released);
    assert!(!sim.is_enabled(lane));
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(resources.free_channels(), 1);
    assert_eq!(sim.free_program_words(), 32);
    assert!(!sim.ops(lane).contains(&SimOp::TransferComplete));
}

#[test]
fn timeout_abandons_a_trigger_that_never_fires() {
    let (mut resources, _sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");

    let mut buffer = [0_u32; 1];
    let result = block_on(resources.run_capture_with_timeout(
        &mut session,
        &mut buffer,
        high_on(5),
        Duration::from_millis(5),
    ));
    assert!(matches!(result, Err(Error::HardwareTimeout)));
    assert_eq!(resources.free_channels(), 1);
}

#[test]
fn free_running_session_can_be_queried_and_restarted() {
    let (mut resources, sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");
    let lane = session.lane().expect("lane held");

    assert_eq!(session.query_word().expect("session live"), None);
    sim.push_rx(lane, 0x55AA_55AA);
    sim.push_rx(lane, 0x0000_FFFF);
    assert_eq!(session.query_word().expect("session live"), Some(0x55AA_55AA));

    sim.clear_events();
    session.restart().expect("session live");
    assert_eq!(sim.rx_len(lane), 0);
    assert_eq!(session.query_word().expect("session live"), None);
    assert_eq!(
        sim.ops(lane),
        [
            SimOp::Restarted(30),
            SimOp::Enabled(true),
            SimOp::GateReleased
        ]
    );
    assert!(sim.is_enabled(lane));

    resources.release_capture(session).expect("slot was empty");
    assert!(!sim.is_enabled(lane));
}

#[test]
fn one_shot_capture_reports_sample_timing() {
    let (mut resources, sim) = sim::resources_at::<1>(100_000_000);
    sim.feed_waveform(&[0x8000_0001]);
    sim.set_level(2, true);
    let config = CaptureConfig {
        pin_base: 2,
        pin_count: PinCount::One,
        clock_divider: divider(2.0),
        trigger: high_on(2),
    };

    let mut buffer = [0_u32; 1];
    let capture = block_on(resources.capture(&config, &mut buffer)).expect("capture completes");

    assert_eq!(capture.pin_count(), PinCount::One);
    assert!((capture.seconds_per_sample() - 2.0e-8).abs() < 1e-15);
    let line = capture.bit_planes().pin(0).expect("pin 0").to_string();
    assert_eq!(line.len(), 32);
    assert!(line.starts_with('1'));
    assert!(line.ends_with('1'));
    assert_eq!(line.matches('1').count(), 2);
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);
}

#[test]
fn one_shot_capture_with_empty_buffer_claims_nothing() {
    let (mut resources, sim) = sim::resources::<1>();
    let config = CaptureConfig {
        pin_base: 0,
        pin_count: PinCount::One,
        clock_divider: divider(1.0),
        trigger: high_on(0),
    };

    assert!(matches!(
        block_on(resources.capture(&config, &mut [])),
        Err(Error::InvalidConfiguration(ConfigError::EmptyBuffer))
    ));
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(resources.free_channels(), 1);
    assert_eq!(sim.free_program_words(), 32);
    assert!(sim.events().is_empty());
}

#[test]
fn one_shot_capture_without_a_channel_returns_its_lane() {
    let (mut resources, sim) = sim::resources::<0>();
    let config = CaptureConfig {
        pin_base: 4,
        pin_count: PinCount::Two,
        clock_divider: divider(1.0),
        trigger: high_on(4),
    };

    let mut buffer = [0_u32; 2];
    assert!(matches!(
        block_on(resources.capture(&config, &mut buffer)),
        Err(Error::ResourceExhausted(Resource::TransferChannel))
    ));
    assert_eq!(resources.free_lanes(), 4);
    assert_eq!(sim.free_program_words(), 32);
    assert!(!sim.is_enabled(0));
}

#[test]
fn unbounded_capture_stays_pending_without_a_trigger() {
    let (mut resources, _sim) = sim::resources::<1>();
    let mut session = resources
        .configure_capture(0, 1, divider(1.0))
        .expect("lane available");

    let mut buffer = [0_u32; 1];
    let mut run = pin!(resources.run_capture_until(
        &mut session,
        &mut buffer,
        high_on(9),
        pending(),
    ));
    let mut cx = Context::from_waker(Waker::noop());
    for _ in 0..3 {
        assert!(run.as_mut().poll(&mut cx).is_pending());
    }
}
