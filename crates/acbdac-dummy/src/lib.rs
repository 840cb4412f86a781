//! acbdac-dummy - Simulated ACB hardware for testing
//!
//! This crate provides an [`MpsseLink`](acbdac_core::link::MpsseLink) that
//! emulates an FT232H driving an I2C tree: a TCA9548A multiplexer with
//! MCP4728 DACs behind its ports. The link decodes the real MPSSE command
//! stream, so everything above it (engine, multiplexer, registry, board)
//! runs unchanged against the simulator.

mod sim;
mod target;

pub use sim::{SimControl, SimLink, SimStats};
pub use target::{AckTarget, I2cTarget, SimMcp4728, SimRegister, SimTca9548a};

use acbdac_core::mux::TCA9548A_DEFAULT_ADDRESS;

/// DACs fitted on the simulated ACB as (multiplexer port, address)
pub const ACB_POPULATION: &[(u8, u8)] = &[(0, 0x60), (0, 0x61), (1, 0x64)];

/// A partially populated ACB: multiplexer at 0x70 and [`ACB_POPULATION`]
pub fn acb_link() -> SimLink {
    ACB_POPULATION
        .iter()
        .fold(SimLink::new().with_mux(TCA9548A_DEFAULT_ADDRESS), |link, &(port, address)| {
            link.with_dac(port, address)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use acbdac_core::board::Board;
    use acbdac_core::config::BoardConfig;
    use acbdac_core::dac::{ChannelConfig, Gain, PowerDown, Vref};
    use acbdac_core::i2c::{BusState, Direction, EngineSettings, I2cEngine, StopCondition};
    use acbdac_core::mux::SelectPolicy;
    use acbdac_core::pinmap::PinMap;
    use acbdac_core::types::{ChannelAddress, DeviceAddress, LogicalBusId, SubChannel};
    use acbdac_core::Error;

    const STEP: f64 = 1.0 / 4095.0;

    fn bus(port: u8) -> LogicalBusId {
        LogicalBusId::new(port).unwrap()
    }

    fn addr(address: u8) -> DeviceAddress {
        DeviceAddress::new(address).unwrap()
    }

    fn config() -> BoardConfig {
        BoardConfig::default()
            .with_read_timeout(Duration::from_millis(20))
            .unwrap()
    }

    fn heater_map() -> PinMap {
        PinMap::new([(
            "HEATER_TEMP1",
            ChannelAddress::new(bus(0), addr(0x61), SubChannel::A),
        )])
        .unwrap()
    }

    fn open(link: SimLink, config: BoardConfig, pinmap: PinMap) -> Board<SimLink> {
        let mut board = Board::open(link, config, pinmap).unwrap();
        board.initialize().unwrap();
        board
    }

    #[test]
    fn test_heater_scenario() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());

        let out = board.output("HEATER_TEMP1").unwrap();
        out.set_normalized(0.5).unwrap();

        let reg = control
            .dac_input(bus(0), addr(0x61), SubChannel::A)
            .unwrap();
        assert_eq!(reg.code, 2048);
        assert!((out.read_normalized().unwrap() - 0.5).abs() <= STEP);

        // Only output A moved
        let b = control
            .dac_input(bus(0), addr(0x61), SubChannel::B)
            .unwrap();
        assert_eq!(b.code, 0);
    }

    #[test]
    fn test_unknown_channel_touches_nothing() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());

        let transactions = board.engine().transactions();
        let writes = control.stats().link_writes;

        assert!(matches!(
            board.output("NONEXISTENT"),
            Err(Error::UnknownChannel(name)) if name == "NONEXISTENT"
        ));
        assert_eq!(board.engine().transactions(), transactions);
        assert_eq!(control.stats().link_writes, writes);
    }

    #[test]
    fn test_scan_reports_exact_set() {
        let link = SimLink::new()
            .with_target(AckTarget::new(0x60))
            .with_target(AckTarget::new(0x61));
        let engine = I2cEngine::new(link, EngineSettings::default()).unwrap();
        assert_eq!(engine.scan().unwrap(), vec![0x60, 0x61]);
    }

    #[test]
    fn test_scan_bus_behind_mux() {
        let board = open(acb_link(), config(), PinMap::acb().unwrap());
        assert_eq!(board.scan_bus(bus(0)).unwrap(), vec![0x60, 0x61]);
        assert_eq!(board.scan_bus(bus(1)).unwrap(), vec![0x64]);
        assert!(board.scan_bus(bus(2)).unwrap().is_empty());
    }

    #[test]
    fn test_registry_slots_all_or_nothing() {
        let board = open(acb_link(), config(), PinMap::acb().unwrap());
        let report = board.registry().report();
        assert_eq!(report.present.len(), ACB_POPULATION.len());
        assert_eq!(report.absent.len(), 24 - ACB_POPULATION.len());

        for ((b, a), _) in board.registry().iter() {
            let expected = ACB_POPULATION.contains(&(b.port(), a.get()));
            match board.device(b, a) {
                Some(dev) => {
                    assert!(expected);
                    assert_eq!(dev.outputs().len(), 4);
                }
                None => assert!(!expected),
            }
        }
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let board = open(acb_link(), config(), PinMap::acb().unwrap());
        let dev = board.device(bus(1), addr(0x64)).unwrap();
        for (i, out) in dev.outputs().iter().enumerate() {
            for v in [0.0, 0.1234, 0.5, 0.999, 1.0] {
                let v = (v + i as f64 * 0.01_f64).min(1.0);
                out.set_normalized(v).unwrap();
                let back = out.read_normalized().unwrap();
                assert!((back - v).abs() <= STEP, "{} read back as {}", v, back);
            }
        }
    }

    #[test]
    fn test_out_of_range_writes_nothing() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();

        let transactions = board.engine().transactions();
        let writes = control.stats().link_writes;
        for v in [-0.001, 1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                out.set_normalized(v),
                Err(Error::ValueOutOfRange { .. })
            ));
        }
        assert!(matches!(
            out.set_raw(0x1000),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert_eq!(board.engine().transactions(), transactions);
        assert_eq!(control.stats().link_writes, writes);
        assert_eq!(control.dac_writes(bus(0), addr(0x61)), Some(0));
    }

    fn quick_settings() -> EngineSettings {
        EngineSettings {
            read_timeout: Duration::from_millis(20),
            ..EngineSettings::default()
        }
    }

    #[test]
    fn test_read_timeout_releases_lock() {
        let link = acb_link().with_transfer_limits(8, 3);
        let control = link.control();
        let board = open(link, config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();
        out.set_raw(0x456).unwrap();

        // Second 8-byte chunk stalls after 3 bytes
        control.stall_read_after(11);
        let err = out.read_raw().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.bus(), Some(bus(0)));
        assert!(matches!(
            err.kind(),
            Error::ReadTimeout {
                address: 0x61,
                op: Direction::Read,
                requested: 24,
                received: 11
            }
        ));

        // Lock released, bus stopped, link back in step
        assert!(board.engine().try_acquire().is_ok());
        assert!(!control.in_transaction());
        assert_eq!(out.read_raw().unwrap(), 0x456);
    }

    #[test]
    fn test_stalled_data_leaves_buffer_untouched() {
        let link = SimLink::new()
            .with_target(SimMcp4728::new(0x60))
            .with_transfer_limits(8, 3);
        let control = link.control();
        let engine = I2cEngine::new(link, quick_settings()).unwrap();

        control.stall_read_after(11);
        let mut buf = [0xEEu8; 24];
        let err = engine.read_into(0x60, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::ReadTimeout {
                address: 0x60,
                op: Direction::Read,
                requested: 24,
                received: 11
            }
        ));
        assert_eq!(buf, [0xEE; 24]);
        assert!(!control.in_transaction());
        assert!(engine.try_acquire().is_ok());

        engine.read_into(0x60, &mut buf).unwrap();
        assert_ne!(buf, [0xEE; 24]);
    }

    #[test]
    fn test_stalled_link_fails_select() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();

        // Nothing comes back, so the multiplexer write is what fails
        control.set_stalled(true);
        let err = out.read_raw().unwrap_err();
        assert!(err.is_retryable());
        match err {
            Error::BusSelectFailed { bus: b, source } => {
                assert_eq!(b, bus(0));
                assert!(matches!(
                    *source,
                    Error::ReadTimeout {
                        address: 0x70,
                        op: Direction::Write,
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(board.engine().try_acquire().is_ok());
        control.set_stalled(false);
        assert!(!control.in_transaction());
        assert!(out.read_raw().is_ok());
    }

    #[test]
    fn test_data_nack_stops_even_when_suppressed() {
        let link = SimLink::new().with_target(AckTarget::new(0x30).with_nack_after(1));
        let control = link.control();
        let engine = I2cEngine::new(link, quick_settings()).unwrap();

        let mut guard = engine.try_acquire().unwrap();
        let err = guard
            .write_with(0x30, &[0x11, 0x22, 0x33], StopCondition::Suppress)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DataNack {
                address: 0x30,
                written: 1
            }
        ));
        assert_eq!(guard.state(), BusState::Idle);
        assert!(!control.in_transaction());
    }

    #[test]
    fn test_wire_error_names_bus() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        control.set_fail_writes(true);
        let err = board.scan_bus(bus(1)).unwrap_err();
        control.set_fail_writes(false);
        // The select write fails first
        assert_eq!(err.bus(), Some(bus(1)));

        let dev = board.device(bus(1), addr(0x64)).unwrap();
        control.stall_read_after(0);
        let err = dev.read_registers().unwrap_err();
        assert!(matches!(err, Error::OnBus { bus: b, .. } if b == bus(1)));
        assert!(err.to_string().starts_with("I2C1: read at 0x64 timed out"));
    }

    #[test]
    fn test_chunked_read_accumulates() {
        let link = acb_link().with_transfer_limits(8, 3);
        let board = open(link, config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();
        out.set_raw(0xABC).unwrap();
        assert_eq!(out.read_raw().unwrap(), 0xABC);
    }

    #[test]
    fn test_absent_device() {
        let map = PinMap::new([(
            "UNFITTED",
            ChannelAddress::new(bus(2), addr(0x67), SubChannel::D),
        )])
        .unwrap();
        let board = open(acb_link(), config(), map);
        assert!(matches!(
            board.output("UNFITTED"),
            Err(Error::DeviceNotPresent { .. })
        ));
        assert!(board.device(bus(2), addr(0x67)).is_none());
    }

    #[test]
    fn test_missing_mux_aborts_initialize() {
        let link = SimLink::new().with_dac(0, 0x60);
        let mut board = Board::open(link, config(), PinMap::acb().unwrap()).unwrap();
        let err = board.initialize().unwrap_err();
        match err {
            Error::BusSelectFailed { bus: b, source } => {
                assert_eq!(b, bus(0));
                assert!(source.is_no_ack());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_verify_select_catches_stuck_mux() {
        // Answers at the mux address but never latches the control byte
        let link = SimLink::new().with_target(AckTarget::new(0x70));
        let config = config().with_verify_select(true);
        let mut board = Board::open(link, config, PinMap::acb().unwrap()).unwrap();
        match board.initialize().unwrap_err() {
            Error::BusSelectFailed { source, .. } => assert!(matches!(
                *source,
                Error::MuxReadbackMismatch {
                    expected: 0x01,
                    actual: 0xFF
                }
            )),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_verify_select_passes_on_real_mux() {
        let config = config().with_verify_select(true);
        let board = open(acb_link(), config, heater_map());
        board.output("HEATER_TEMP1").unwrap().set_raw(1).unwrap();
    }

    #[test]
    fn test_cached_select_skips_repeat_writes() {
        let starts_per_write = |policy: SelectPolicy| {
            let link = acb_link();
            let control = link.control();
            let board = open(link, config().with_select_policy(policy), heater_map());
            let out = board.output("HEATER_TEMP1").unwrap();
            out.set_raw(1).unwrap();
            let before = control.stats().starts;
            out.set_raw(2).unwrap();
            control.stats().starts - before
        };
        assert_eq!(starts_per_write(SelectPolicy::Always), 2);
        assert_eq!(starts_per_write(SelectPolicy::Cached), 1);
    }

    #[test]
    fn test_alternating_buses_reselect() {
        let link = acb_link();
        let control = link.control();
        let board = open(
            link,
            config().with_select_policy(SelectPolicy::Cached),
            PinMap::acb().unwrap(),
        );
        let a = board.device(bus(0), addr(0x60)).unwrap().output(SubChannel::A);
        let b = board.device(bus(1), addr(0x64)).unwrap().output(SubChannel::A);
        a.set_raw(100).unwrap();
        assert_eq!(control.mux_control(), Some(0x01));
        b.set_raw(200).unwrap();
        assert_eq!(control.mux_control(), Some(0x02));
        assert_eq!(a.read_raw().unwrap(), 100);
        assert_eq!(b.read_raw().unwrap(), 200);
    }

    #[test]
    fn test_nested_operation_fails_closed() {
        let board = open(acb_link(), config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();
        let guard = board.engine().try_acquire().unwrap();
        assert!(matches!(out.set_normalized(0.25), Err(Error::LockContention)));
        drop(guard);
        assert!(out.set_normalized(0.25).is_ok());
    }

    #[test]
    fn test_initialize_probes_once() {
        let mut board = Board::open(acb_link(), config(), PinMap::acb().unwrap()).unwrap();
        let first = board.initialize().unwrap();
        let transactions = board.engine().transactions();
        let second = board.initialize().unwrap();
        assert_eq!(first, second);
        assert_eq!(board.engine().transactions(), transactions);
    }

    #[test]
    fn test_set_config_keeps_code() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        let out = board.output("HEATER_TEMP1").unwrap();
        out.set_raw(0x321).unwrap();

        let config = ChannelConfig {
            vref: Vref::Internal,
            gain: Gain::X2,
            power_down: PowerDown::Normal,
        };
        out.set_config(config).unwrap();

        let state = out.read_state().unwrap();
        assert_eq!(state.code, 0x321);
        assert_eq!(state.config, config);
        let reg = control
            .dac_input(bus(0), addr(0x61), SubChannel::A)
            .unwrap();
        assert_eq!(reg.config, 0x90);
    }

    #[test]
    fn test_usb_failure_is_link_error() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        control.set_fail_writes(true);
        let err = board
            .output("HEATER_TEMP1")
            .unwrap()
            .set_raw(5)
            .unwrap_err();
        assert!(err.is_retryable());
        control.set_fail_writes(false);
        assert!(board.engine().try_acquire().is_ok());
    }

    #[test]
    fn test_close_deselects_mux() {
        let link = acb_link();
        let control = link.control();
        let board = open(link, config(), heater_map());
        board.output("HEATER_TEMP1").unwrap().set_raw(7).unwrap();
        assert_eq!(control.mux_control(), Some(0x01));

        let _link = board.close();
        assert_eq!(control.mux_control(), Some(0x00));
        assert!(!control.in_transaction());
    }
}
