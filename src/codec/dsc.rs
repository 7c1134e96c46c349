// MIT License - Copyright (c) 2021 TJForc
// DSC fixed-field framing with checksum

use crate::codec::{Command, Event};
use crate::config::Dialect;
use crate::constants::dsc as cmd;
use crate::error::{Result, TpiError};

/// Low byte of the sum of the ASCII values, as two uppercase hex digits.
pub fn checksum(code: &str, data: &str) -> String {
    let sum = code
        .bytes()
        .chain(data.bytes())
        .fold(0u32, |acc, b| acc + b as u32);
    format!("{:02X}", sum & 0xFF)
}

/// Build a complete frame: code, data, checksum.
pub fn encode_frame(code: &str, data: &str) -> String {
    format!("{code}{data}{}", checksum(code, data))
}

/// Split a frame into code and data after verifying its checksum.
pub fn parse_frame(frame: &str) -> Result<(&str, &str)> {
    let frame = frame.trim();
    if frame.len() < 5 || !frame.is_ascii() {
        return Err(TpiError::frame(frame, "DSC frame shorter than 5 characters"));
    }
    let code = &frame[..3];
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TpiError::frame(frame, "DSC code is not numeric"));
    }
    let data = &frame[3..frame.len() - 2];
    let actual = &frame[frame.len() - 2..];
    let expected = checksum(code, data);
    if actual != expected {
        return Err(TpiError::ChecksumMismatch {
            line: frame.to_string(),
            expected,
            actual: actual.to_string(),
        });
    }
    Ok((code, data))
}

/// Decode one frame. The login code carries its outcome in the data digit,
/// which selects one of four registry entries.
pub fn decode(frame: &str) -> Result<Event> {
    let (code, data) = parse_frame(frame)?;
    if code == cmd::LOGIN_STATUS {
        let status = data
            .chars()
            .next()
            .filter(|c| ('0'..='3').contains(c))
            .ok_or_else(|| TpiError::frame(frame, "unknown login status"))?;
        return Ok(Event::new(Dialect::Dsc, format!("{code}{status}"), data));
    }
    Ok(Event::new(Dialect::Dsc, code, data))
}

fn unsupported(command: &Command) -> TpiError {
    TpiError::Unsupported {
        operation: command.name(),
        dialect: Dialect::Dsc.name(),
    }
}

/// Encode a command as a single checksummed frame.
pub fn encode(command: &Command) -> Result<Vec<String>> {
    let line = match command {
        Command::KeepAlive => encode_frame(cmd::KEEP_ALIVE, ""),
        Command::StatusReport => encode_frame(cmd::STATUS_REPORT, ""),
        Command::DumpZoneTimers => encode_frame(cmd::DUMP_ZONE_TIMERS, ""),
        Command::Login { password } => encode_frame(cmd::LOGIN, password),
        Command::Keypress { partition, keys } => {
            encode_frame(cmd::KEYPRESS, &format!("{}{keys}", partition.unwrap_or(1)))
        }
        Command::ArmAway { code, partition } => {
            encode_frame(cmd::ARM_AWAY, &format!("{partition}{code}"))
        }
        Command::ArmStay { code, partition } => {
            encode_frame(cmd::ARM_STAY, &format!("{partition}{code}"))
        }
        Command::ArmMax { code, partition } => {
            encode_frame(cmd::ARM_MAX, &format!("{partition}{code}"))
        }
        Command::Disarm { code, partition } => {
            encode_frame(cmd::DISARM, &format!("{partition}{code}"))
        }
        Command::Raw { code, data } => encode_frame(code, data),
        Command::ChangeDefaultPartition { .. }
        | Command::BypassZone { .. }
        | Command::UnbypassZone { .. }
        | Command::InitialStateDump
        | Command::HostInfo => return Err(unsupported(command)),
    };
    Ok(vec![line])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Handler;

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(checksum("000", ""), "90");
        assert_eq!(checksum("505", "3"), "CD");
        assert_eq!(encode_frame("005", "user"), "005user54");
    }

    #[test]
    fn test_roundtrip_and_single_character_corruption() {
        let frame = encode_frame("609", "005");
        let (code, data) = parse_frame(&frame).unwrap();
        assert_eq!((code, data), ("609", "005"));

        let replacements = ['0', '1', '9', 'A', 'F', 'x'];
        for i in 0..frame.len() {
            for r in replacements {
                let mut bytes = frame.clone().into_bytes();
                if bytes[i] == r as u8 {
                    continue;
                }
                bytes[i] = r as u8;
                let corrupted = String::from_utf8(bytes).unwrap();
                assert!(
                    parse_frame(&corrupted).is_err(),
                    "corruption {corrupted:?} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_checksum_mismatch_error() {
        assert!(matches!(
            parse_frame("6090051F"),
            Err(TpiError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_short_frame() {
        assert!(matches!(parse_frame("50"), Err(TpiError::FrameParse { .. })));
    }

    #[test]
    fn test_login_substatus_remap() {
        for (digit, handler) in [
            ('0', Handler::LoginFailure),
            ('1', Handler::LoginSuccess),
            ('2', Handler::LoginTimeout),
            ('3', Handler::Login),
        ] {
            let frame = encode_frame("505", &digit.to_string());
            let event = decode(&frame).unwrap();
            assert_eq!(event.handler(), Some(handler));
        }
        assert!(decode(&encode_frame("505", "7")).is_err());
    }

    #[test]
    fn test_encode_arm_and_disarm() {
        let lines = encode(&Command::ArmStay {
            code: "1234".into(),
            partition: 1,
        })
        .unwrap();
        assert_eq!(lines, vec![encode_frame("031", "11234")]);
        assert!(matches!(
            encode(&Command::BypassZone { zone: 1 }),
            Err(TpiError::Unsupported { .. })
        ));
    }
}
