#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

use cfg_if::cfg_if;
use cortex_m::asm;
use defmt::println;
use defmt_rtt as _;
use panic_probe as _;

mod ahrs;
mod cfg_storage;
mod consts;
mod control_input;
mod error;
mod flight_ctrls;
mod i2c_txn;
mod numeric;
mod pid;
mod safety;
mod sdl;
mod sensors;
mod shell;
mod state;
mod telemetry;
mod telemetry_bridge;

use control_input::{Oim, QuadControl};
use flight_ctrls::{FlightController, MixInputs};
use i2c_txn::{I2cBus, TransactionQueue};
use safety::Watchdog;
use sensors::{
    imu::{AccelGyro, AccelRange, GyroRange},
    mag::{Magnetometer, Range as MagRange},
    SensorSample,
};
use state::UserCfg;

cfg_if! {
    if #[cfg(feature = "h7")] {
        // H743/H723: one bank, 8 sectors of 128kb each. We keep tuning data
        // in the last sector to stay well clear of the program image.
        const FLASH_CFG_SECTOR: usize = 7;
    } else if #[cfg(feature = "g4")] {
        // G47x/G48x, single-bank mode: 128 pages of 4kb each.
        const FLASH_CFG_PAGE: usize = 127;
    }
}

/// I2C address the accelerometer/gyroscope responds to.
const IMU_ADDR: u8 = 0x68;
/// I2C address the magnetometer responds to.
const MAG_ADDR: u8 = 0x1e;
/// Ticks `TransactionQueue::wait` spins for during synchronous boot
/// transactions before giving up with `Error::BusTimeout`.
const BOOT_WAIT_TICKS: u32 = 10_000;

/// Thin wrapper tying the HAL's I2C peripheral to our `I2cBus` trait, so the
/// transaction engine stays host-testable against a fake bus while real
/// firmware drives actual silicon.
struct HalI2cBus<'a> {
    i2c: &'a mut hal::i2c::I2c<hal::pac::I2C1>,
}

impl<'a> I2cBus for HalI2cBus<'a> {
    fn set_slave_addr(&mut self, addr: u8, _receive: bool) {
        self.i2c.set_slave_address(addr as u16);
    }

    fn put(&mut self, byte: u8) {
        self.i2c.write_one(byte);
    }

    fn get(&mut self) -> u8 {
        self.i2c.read_one()
    }

    fn single_send(&mut self) {}
    fn single_receive(&mut self) {}
    fn burst_send_start(&mut self) {}
    fn burst_send_cont(&mut self) {}
    fn burst_send_finish(&mut self) {}
    fn burst_receive_start(&mut self) {}
    fn burst_receive_cont(&mut self) {}
    fn burst_receive_finish(&mut self) {}

    fn had_error(&mut self) -> bool {
        self.i2c.has_error()
    }
}

#[rtic::app(device = hal::pac, peripherals = true, dispatchers = [USART2, USART3])]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        i2c1: hal::i2c::I2c<hal::pac::I2C1>,
        queue: TransactionQueue,
        accel_gyro: AccelGyro,
        magnetometer: Option<Magnetometer>,
        attitude: ahrs::AttitudeEstimator,
        fc: FlightController,
        oim: Oim,
        control: QuadControl,
        telemetry: telemetry::Registry,
        watchdog: Watchdog,
        cfg: UserCfg,
        flash: hal::flash::Flash,
        console: hal::usart::Usart<hal::pac::USART1>,
    }

    #[local]
    struct Local {
        rx_buf: heapless::String<{ consts::SHELL_LINE_LEN }>,
    }

    /// Powers on sensors, calibrates the gyro, and loads (or defaults) the
    /// saved PID/calibration settings. The gyro calibration runs
    /// synchronously before interrupts are unmasked, using the same
    /// `wait`-driven boot sequence the transaction engine exposes for
    /// host tests.
    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;

        let clock_cfg = hal::clocks::Clocks::default();
        clock_cfg.setup().unwrap();

        let mut flash = hal::flash::Flash::new(dp.FLASH);
        let cfg = UserCfg::load(&flash);

        let mut i2c1 = hal::i2c::I2c::new(dp.I2C1, Default::default(), &clock_cfg);

        let mut queue = TransactionQueue::new();
        let mut accel_gyro = AccelGyro::new(IMU_ADDR, AccelRange::G4, GyroRange::Dps500);
        {
            let mut bus = HalI2cBus { i2c: &mut i2c1 };
            accel_gyro.configure(&mut queue, &mut bus, BOOT_WAIT_TICKS).ok();
            accel_gyro.calibrate_gyro(&mut queue, &mut bus, BOOT_WAIT_TICKS).ok();
        }

        let magnetometer = if cfg.magnetometer_enabled {
            let mut mag = Magnetometer::new(MAG_ADDR, MagRange::Ga130);
            mag.calibration = cfg.mag_calibration.into();
            let mut bus = HalI2cBus { i2c: &mut i2c1 };
            mag.configure(&mut queue, &mut bus, BOOT_WAIT_TICKS).ok();
            Some(mag)
        } else {
            None
        };

        let mut fc = FlightController::new();
        fc.pitch_pid.set_gains(cfg.pitch_gains.into());
        fc.roll_pid.set_gains(cfg.roll_gains.into());
        fc.yaw_pid.set_gains(cfg.yaw_gains.into());
        fc.altitude_pid.set_gains(cfg.altitude_gains.into());
        fc.yaw_regulation_enabled = cfg.yaw_regulation_enabled;
        fc.altitude_stabilization_enabled = cfg.altitude_stabilization_enabled;
        fc.set_motor_deadband_offsets(cfg.motor_deadband_offsets);

        let console = hal::usart::Usart::new(
            dp.USART1,
            consts::CONSOLE_BAUD,
            Default::default(),
            &clock_cfg,
        );

        let mut telemetry = telemetry::Registry::default();
        telemetry
            .subscribe_periodic(
                "sensors",
                &telemetry_bridge::SENSORS_KEYS,
                consts::TELEMETRY_PERIOD_TICKS,
                telemetry_bridge::sensors_accessor,
            )
            .ok();
        telemetry
            .subscribe_periodic(
                "IMU",
                &telemetry_bridge::IMU_KEYS,
                consts::TELEMETRY_PERIOD_TICKS,
                telemetry_bridge::imu_accessor,
            )
            .ok();
        telemetry
            .subscribe_periodic(
                "PID",
                &telemetry_bridge::PID_KEYS,
                consts::TELEMETRY_PERIOD_TICKS,
                telemetry_bridge::pid_accessor,
            )
            .ok();
        telemetry
            .subscribe_periodic(
                "radio",
                &telemetry_bridge::RADIO_KEYS,
                consts::TELEMETRY_PERIOD_TICKS,
                telemetry_bridge::radio_accessor,
            )
            .ok();
        telemetry
            .subscribe_input(
                "RemoteControl",
                &telemetry_bridge::REMOTE_CONTROL_KEYS,
                telemetry_bridge::remote_control_setter,
            )
            .ok();

        println!("corvid-fc init complete");

        (
            Shared {
                i2c1,
                queue,
                accel_gyro,
                magnetometer,
                attitude: ahrs::AttitudeEstimator::new(),
                fc,
                oim: Oim::default(),
                control: QuadControl::default(),
                telemetry,
                watchdog: Watchdog::new(consts::MAX_CONSECUTIVE_FAULTS, consts::IMU_STALE_TIMEOUT_TICKS),
                cfg,
                flash,
                console,
            },
            Local {
                rx_buf: heapless::String::new(),
            },
        )
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            asm::wfi();
        }
    }

    /// I2C peripheral interrupt: advances whatever transaction is currently
    /// in flight. Highest priority in the system since a stalled bus state
    /// machine blocks every sensor read behind it.
    #[task(binds = I2C1_EV, shared = [queue, i2c1], priority = 6)]
    fn i2c_isr(cx: i2c_isr::Context) {
        (cx.shared.queue, cx.shared.i2c1).lock(|queue, i2c1| {
            let mut bus = HalI2cBus { i2c: i2c1 };
            queue.on_interrupt(&mut bus);
        });
    }

    /// Sensor data link tick: kicks the accel+gyro burst read every period
    /// and, when the magnetometer is enabled, a magnetometer burst read
    /// alongside it. Neither read's completion is handled here — the bus
    /// ISR that eventually drives them to completion can't reach any other
    /// `Shared` resource, so results land in `sdl`'s atomics bridge and the
    /// accel+gyro callback spawns `ae_task` itself.
    #[task(binds = TIM5, shared = [queue, i2c1, magnetometer], priority = 4)]
    fn sdl_task(cx: sdl_task::Context) {
        (cx.shared.queue, cx.shared.i2c1, cx.shared.magnetometer).lock(|queue, i2c1, magnetometer| {
            let mut bus = HalI2cBus { i2c: i2c1 };
            queue.async_reg_read(
                &mut bus,
                IMU_ADDR,
                sensors::imu::Reg::AccelXoutH as u8,
                14,
                Some(sdl::on_accel_gyro_done),
            );
            if magnetometer.is_some() {
                queue.async_reg_read(
                    &mut bus,
                    MAG_ADDR,
                    sensors::mag::Reg::DataXMsb as u8,
                    6,
                    Some(sdl::on_mag_done),
                );
            }
        });
    }

    /// Attitude estimation task: spawned from `sdl`'s accel+gyro completion
    /// callback. Converts whatever frame the bridge handed off, runs the
    /// Madgwick update, notes freshness against the watchdog, and spawns
    /// `fc_task` so the control loop runs against the freshest estimate.
    #[task(shared = [accel_gyro, magnetometer, attitude, watchdog], priority = 5)]
    fn ae_task(cx: ae_task::Context) {
        (
            cx.shared.accel_gyro,
            cx.shared.magnetometer,
            cx.shared.attitude,
            cx.shared.watchdog,
        )
            .lock(|accel_gyro, magnetometer, attitude, watchdog| {
                match sdl::take_accel_gyro() {
                    Some(Ok(raw)) => {
                        watchdog.note_freshness(true);
                        let (accel, gyro) = accel_gyro.convert(&raw);
                        let mag = magnetometer.as_ref().and_then(|m| match sdl::take_mag() {
                            Some(Ok(raw_mag)) => Some(m.convert(&raw_mag)),
                            _ => None,
                        });
                        let sample = SensorSample { accel, gyro, mag };
                        attitude.update(&sample, consts::SAMPLE_PERIOD_S);
                        telemetry_bridge::note_sensors(accel, gyro);
                        telemetry_bridge::note_imu(attitude.yaw, attitude.pitch, attitude.roll);
                    }
                    Some(Err(e)) => {
                        watchdog.note(Err(e));
                        watchdog.note_freshness(false);
                    }
                    None => watchdog.note_freshness(false),
                }
            });
        fc_task::spawn().ok();
    }

    /// Flight control task: spawned from `ae_task`'s completion. Runs the
    /// PID/mixing pipeline against the latest attitude estimate and
    /// operator input, then latches the motors off if the watchdog has
    /// tripped.
    #[task(shared = [attitude, fc, oim, control, watchdog], priority = 3)]
    fn fc_task(cx: fc_task::Context) {
        (
            cx.shared.attitude,
            cx.shared.fc,
            cx.shared.oim,
            cx.shared.control,
            cx.shared.watchdog,
        )
            .lock(|attitude, fc, oim, control, watchdog| {
                if let Some(update) = telemetry_bridge::take_remote_control_update() {
                    control.throttle = update.throttle;
                    control.direction = update.direction;
                    control.yaw = update.yaw;
                    control.beep = update.beep;
                    control.shut_off_motors = update.shut_off_motors;
                    oim.note_json_update();
                }

                oim.merge(control);
                telemetry_bridge::note_radio(oim.radio.channels);

                if control.shut_off_motors || watchdog.tripped() {
                    fc.shut_off_motors();
                }

                let inputs = MixInputs {
                    pitch: core::f32::consts::FRAC_PI_4 * control.direction[0],
                    roll: core::f32::consts::FRAC_PI_4 * control.direction[1],
                    yaw: control.yaw,
                    throttle: control.throttle,
                    az: 0.0,
                };

                fc.run(inputs, attitude.pitch, attitude.roll, attitude.yaw, consts::SAMPLE_PERIOD_S);
                telemetry_bridge::note_pid(
                    fc.pitch_pid.out,
                    fc.roll_pid.out,
                    fc.yaw_pid.out,
                    fc.altitude_pid.out,
                );
            });
    }

    /// Telemetry tick: advances the data-source registry's countdown
    /// timers and renders any due sources to JSON lines for the console.
    #[task(binds = TIM4, shared = [telemetry, console], priority = 2)]
    fn telemetry_tick(cx: telemetry_tick::Context) {
        (cx.shared.telemetry, cx.shared.console).lock(|registry, console| {
            let mut out: [heapless::String<{ telemetry::json::MAX_LINE }>; 4] =
                core::array::from_fn(|_| heapless::String::new());
            let n = registry.poll(1, false, &mut out);
            for line in out.iter().take(n) {
                console.write(line.as_bytes()).ok();
            }
        });
    }

    /// Console UART interrupt: accumulates received bytes into a line
    /// buffer and, on a newline, parses and dispatches the resulting
    /// command. Lowest priority; never blocks flight-critical work.
    #[task(binds = USART1, shared = [cfg, fc, telemetry, console], local = [rx_buf], priority = 1)]
    fn shell_isr(cx: shell_isr::Context) {
        let rx_buf = cx.local.rx_buf;

        (cx.shared.cfg, cx.shared.fc, cx.shared.telemetry, cx.shared.console).lock(
            |cfg, fc, telemetry, console| {
                let byte = match console.read_one() {
                    Ok(b) => b,
                    Err(_) => return,
                };

                match byte {
                    b'\n' | b'\r' => {
                        if !rx_buf.is_empty() {
                            if rx_buf.starts_with('{') {
                                telemetry.handle_input(rx_buf.as_str()).ok();
                            } else if let Some(cmd) = shell::parse(rx_buf.as_str()) {
                                if let Ok(action) = shell::dispatch(&cmd) {
                                    apply_shell_action(action, cfg, fc, telemetry, console);
                                }
                            }
                            rx_buf.clear();
                        }
                    }
                    b => {
                        if rx_buf.push(b as char).is_err() {
                            // Overlong line; drop it and start fresh rather
                            // than dispatching a truncated command.
                            rx_buf.clear();
                        }
                    }
                }
            },
        );
    }
}

/// Applies one decoded shell action against live flight-controller state,
/// writing a short response line back over the console for anything that
/// produces output. PID-gain commands update both the live `Pid` and the
/// mirrored `UserCfg`, matching the source firmware's "tune over the wire,
/// persist on request" console workflow.
fn apply_shell_action(
    action: shell::Action<'_>,
    cfg: &mut UserCfg,
    fc: &mut FlightController,
    telemetry: &mut telemetry::Registry,
    console: &mut hal::usart::Usart<hal::pac::USART1>,
) {
    use shell::Action;

    match action {
        Action::ListSources => {
            for name in telemetry.list_names() {
                console.write(name.as_bytes()).ok();
                console.write(b"\r\n").ok();
            }
        }
        Action::Enable(name) => telemetry.set_enabled(name, true),
        Action::Disable(name) => telemetry.set_enabled(name, false),
        Action::SetYawPid(gains) => {
            fc.yaw_pid.set_gains(gains);
            cfg.yaw_gains = gains.into();
        }
        Action::SetPitchPid(gains) => {
            fc.pitch_pid.set_gains(gains);
            cfg.pitch_gains = gains.into();
        }
        Action::SetRollPid(gains) => {
            fc.roll_pid.set_gains(gains);
            cfg.roll_gains = gains.into();
        }
        Action::SetAltitudePid(gains) => {
            fc.altitude_pid.set_gains(gains);
            cfg.altitude_gains = gains.into();
        }
        // Raw I2C debugging commands and the legacy calibration-mode toggles
        // talk directly to the bus driver rather than the control loop; left
        // unimplemented here since this console exists for tuning and
        // telemetry, not for bit-banging the sensor bus by hand.
        Action::Start
        | Action::ProgModeEnable
        | Action::ProgModeDisable
        | Action::SendCsvMagn
        | Action::I2cSelect(_)
        | Action::I2cRegRead { .. }
        | Action::I2cRegWrite { .. }
        | Action::I2cRegRmw { .. }
        | Action::I2cWrite { .. } => {
            console.write(b"unsupported\r\n").ok();
        }
    }
}
