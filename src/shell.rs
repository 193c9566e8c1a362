//! Command-line shell over the console UART: the handful of commands the
//! source firmware's `UARTConsole` exposed for field use and calibration.

use heapless::Vec;

use crate::error::Error;
use crate::pid::PidGains;

pub const MAX_ARGS: usize = 6;
pub const MAX_ARG_LEN: usize = 16;

/// One parsed shell line: a command name plus up to `MAX_ARGS` argument
/// slices, borrowed from the input buffer.
pub struct Command<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str, MAX_ARGS>,
}

/// Splits a line on whitespace into a command and its arguments.
pub fn parse(line: &str) -> Option<Command<'_>> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    let mut args = Vec::new();
    for w in words {
        args.push(w).ok()?;
    }
    Some(Command { name, args })
}

fn require_args(args: &[&str], min: usize, max: usize) -> Result<(), Error> {
    if args.len() < min {
        Err(Error::TooFewArgs)
    } else if args.len() > max {
        Err(Error::TooManyArgs)
    } else {
        Ok(())
    }
}

fn parse_pid_args(args: &[&str]) -> Result<PidGains, Error> {
    require_args(args, 3, 4)?;
    let kp: f32 = args[0].parse().map_err(|_| Error::BadJson)?;
    let ki: f32 = args[1].parse().map_err(|_| Error::BadJson)?;
    let kd: f32 = args[2].parse().map_err(|_| Error::BadJson)?;
    let i_limit: f32 = if args.len() == 4 {
        args[3].parse().map_err(|_| Error::BadJson)?
    } else {
        0.0
    };
    Ok(PidGains::new(kp, ki, kd, i_limit))
}

/// One request the shell decoded from a command line, for the caller (the
/// shell task in `main.rs`) to act on against the real hardware/control
/// state. Keeping this as data rather than invoking callbacks directly
/// keeps the parser host-testable.
pub enum Action<'a> {
    ListSources,
    Enable(&'a str),
    Disable(&'a str),
    Start,
    ProgModeEnable,
    ProgModeDisable,
    SendCsvMagn,
    SetYawPid(PidGains),
    SetPitchPid(PidGains),
    SetRollPid(PidGains),
    SetAltitudePid(PidGains),
    I2cSelect(u8),
    I2cRegRead { addr: u8, register: u8, count: u8 },
    I2cRegWrite { addr: u8, register: u8, value: u8 },
    I2cRegRmw { addr: u8, register: u8, mask: u8, value: u8 },
    I2cWrite { addr: u8, value: u8 },
}

fn parse_u8(s: &str) -> Result<u8, Error> {
    if let Some(hex) = s.strip_prefix("0x") {
        u8::from_str_radix(hex, 16).map_err(|_| Error::BadJson)
    } else {
        s.parse().map_err(|_| Error::BadJson)
    }
}

/// Decodes one shell command into an `Action`, or an `Error` describing why
/// it couldn't be (unknown command, wrong argument count, unparsable
/// argument).
pub fn dispatch<'a>(cmd: &Command<'a>) -> Result<Action<'a>, Error> {
    match cmd.name {
        "listSources" => {
            require_args(&cmd.args, 0, 0)?;
            Ok(Action::ListSources)
        }
        "enable" => {
            require_args(&cmd.args, 1, 1)?;
            Ok(Action::Enable(cmd.args[0]))
        }
        "disable" => {
            require_args(&cmd.args, 1, 1)?;
            Ok(Action::Disable(cmd.args[0]))
        }
        "start" => {
            require_args(&cmd.args, 0, 0)?;
            Ok(Action::Start)
        }
        "progModeEn" => {
            require_args(&cmd.args, 0, 0)?;
            Ok(Action::ProgModeEnable)
        }
        "progModeDis" => {
            require_args(&cmd.args, 0, 0)?;
            Ok(Action::ProgModeDisable)
        }
        "sendCSVMagn" => {
            require_args(&cmd.args, 0, 0)?;
            Ok(Action::SendCsvMagn)
        }
        "setYawPID" => Ok(Action::SetYawPid(parse_pid_args(&cmd.args)?)),
        "setPitchPID" => Ok(Action::SetPitchPid(parse_pid_args(&cmd.args)?)),
        "setRollPID" => Ok(Action::SetRollPid(parse_pid_args(&cmd.args)?)),
        "setAltitudePID" => Ok(Action::SetAltitudePid(parse_pid_args(&cmd.args)?)),
        "i2cSelect" => {
            require_args(&cmd.args, 1, 1)?;
            Ok(Action::I2cSelect(parse_u8(cmd.args[0])?))
        }
        "i2cregr" => {
            require_args(&cmd.args, 3, 3)?;
            Ok(Action::I2cRegRead {
                addr: parse_u8(cmd.args[0])?,
                register: parse_u8(cmd.args[1])?,
                count: parse_u8(cmd.args[2])?,
            })
        }
        "i2cregw" => {
            require_args(&cmd.args, 3, 3)?;
            Ok(Action::I2cRegWrite {
                addr: parse_u8(cmd.args[0])?,
                register: parse_u8(cmd.args[1])?,
                value: parse_u8(cmd.args[2])?,
            })
        }
        "i2cregrmw" => {
            require_args(&cmd.args, 4, 4)?;
            Ok(Action::I2cRegRmw {
                addr: parse_u8(cmd.args[0])?,
                register: parse_u8(cmd.args[1])?,
                mask: parse_u8(cmd.args[2])?,
                value: parse_u8(cmd.args[3])?,
            })
        }
        "i2cw" => {
            require_args(&cmd.args, 2, 2)?;
            Ok(Action::I2cWrite {
                addr: parse_u8(cmd.args[0])?,
                value: parse_u8(cmd.args[1])?,
            })
        }
        _ => Err(Error::UnknownCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(line: &str) -> Result<Action<'_>, Error> {
        let cmd = parse(line).expect("should parse");
        dispatch(&cmd)
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert_eq!(act("frobnicate").err(), Some(Error::UnknownCommand));
    }

    #[test]
    fn enable_requires_exactly_one_arg() {
        assert_eq!(act("enable").err(), Some(Error::TooFewArgs));
        assert_eq!(act("enable a b").err(), Some(Error::TooManyArgs));
        assert!(act("enable sensors").is_ok());
    }

    #[test]
    fn set_pitch_pid_parses_gains() {
        match act("setPitchPID 0.16 0.48 0.0004 1.2").unwrap() {
            Action::SetPitchPid(gains) => {
                assert!((gains.kp - 0.16).abs() < 1e-6);
                assert!((gains.i_limit - 1.2).abs() < 1e-6);
            }
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn set_pid_without_i_limit_defaults_to_zero() {
        match act("setYawPID 0.035 0.035 0.0").unwrap() {
            Action::SetYawPid(gains) => assert_eq!(gains.i_limit, 0.0),
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn i2c_regr_parses_hex_and_decimal_args() {
        match act("i2cregr 0x68 0x3b 14").unwrap() {
            Action::I2cRegRead { addr, register, count } => {
                assert_eq!(addr, 0x68);
                assert_eq!(register, 0x3b);
                assert_eq!(count, 14);
            }
            _ => panic!("wrong action"),
        }
    }

    #[test]
    fn bad_numeric_argument_is_rejected() {
        assert_eq!(act("i2cSelect not-a-number").err(), Some(Error::BadJson));
    }
}
