// MIT License - Copyright (c) 2021 TJForc
// Honeywell / Uno sentinel framing

use crate::codec::{Command, Event};
use crate::config::Dialect;
use crate::constants::{honeywell as cmd, ACK_SENTINEL, EVENT_SENTINEL, FRAME_TERMINATOR};
use crate::error::{Result, TpiError};

fn is_sentinel(c: char) -> bool {
    c == EVENT_SENTINEL || c == ACK_SENTINEL
}

/// Split a line holding several frames (`%00,...$%01,...$`) at every
/// terminator that is followed by a sentinel.
pub fn split_frames(line: &str) -> Vec<&str> {
    let mut frames = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == FRAME_TERMINATOR
            && let Some(&(next, n)) = chars.peek()
            && is_sentinel(n)
        {
            frames.push(&line[start..=i]);
            start = next;
        }
    }
    if start < line.len() {
        frames.push(&line[start..]);
    }
    frames
}

/// Decode one frame.
///
/// The sentinel stays part of the code so `%00` and `^00` remain distinct.
/// Unframed text is a login exchange line while not logged in, and an error after.
pub fn decode(dialect: Dialect, frame: &str, logged_in: bool) -> Result<Event> {
    let frame = frame.trim();

    let framed = frame.starts_with(is_sentinel)
        && frame.rfind(FRAME_TERMINATOR).is_some_and(|end| end > 1);
    if framed {
        let end = frame.rfind(FRAME_TERMINATOR).unwrap_or(frame.len());
        let body = &frame[..end];
        let (code, data) = body.split_once(',').unwrap_or((body, ""));
        return Ok(Event::new(dialect, code, data));
    }

    if !logged_in {
        return Ok(Event::new(dialect, frame, ""));
    }

    Err(TpiError::frame(frame, "missing sentinel framing"))
}

fn frame(code: &str, data: &str) -> String {
    format!("{ACK_SENTINEL}{code},{data}{FRAME_TERMINATOR}")
}

fn keypresses(partition: u32, keys: &str) -> Vec<String> {
    keys.chars()
        .map(|key| frame(cmd::PARTITION_KEYPRESS, &format!("{partition},{key}")))
        .collect()
}

fn unsupported(command: &Command, dialect: Dialect) -> TpiError {
    TpiError::Unsupported {
        operation: command.name(),
        dialect: dialect.name(),
    }
}

/// Encode a command. Arming without a direct command is a keypress sequence of
/// the user code followed by the mode key.
pub fn encode(dialect: Dialect, command: &Command) -> Result<Vec<String>> {
    let uno = dialect == Dialect::Uno;
    let lines = match command {
        Command::KeepAlive => vec![frame(cmd::KEEP_ALIVE, "")],
        Command::DumpZoneTimers => vec![frame(cmd::DUMP_ZONE_TIMERS, "")],
        Command::Login { password } => vec![password.clone()],
        Command::ChangeDefaultPartition { partition } => {
            vec![frame(cmd::CHANGE_DEFAULT_PARTITION, &partition.to_string())]
        }
        Command::Keypress { partition: Some(p), keys } => keypresses(*p, keys),
        Command::Keypress { partition: None, keys } => vec![keys.clone()],
        Command::ArmStay { partition, .. } if uno => {
            vec![frame(cmd::STAY_ARM, &partition.to_string())]
        }
        Command::ArmAway { partition, .. } if uno => {
            vec![frame(cmd::AWAY_ARM, &partition.to_string())]
        }
        Command::Disarm { code, partition } if uno => {
            vec![frame(cmd::DISARM, &format!("{partition},{code}"))]
        }
        Command::ArmAway { code, partition } => {
            keypresses(*partition, &format!("{code}{}", cmd::KEY_ARM_AWAY))
        }
        Command::ArmStay { code, partition } => {
            keypresses(*partition, &format!("{code}{}", cmd::KEY_ARM_STAY))
        }
        Command::ArmMax { code, partition } => {
            keypresses(*partition, &format!("{code}{}", cmd::KEY_ARM_MAX))
        }
        Command::Disarm { code, partition } => {
            keypresses(*partition, &format!("{code}{}", cmd::KEY_DISARM))
        }
        Command::BypassZone { zone } if uno => vec![frame(cmd::BYPASS_ZONE, &zone.to_string())],
        Command::UnbypassZone { zone } if uno => {
            vec![frame(cmd::UNBYPASS_ZONE, &zone.to_string())]
        }
        Command::InitialStateDump if uno => vec![frame(cmd::INITIAL_STATE_DUMP, "")],
        Command::HostInfo if uno => vec![frame(cmd::HOST_INFO, "")],
        Command::Raw { code, data } => vec![frame(code, data)],
        Command::BypassZone { .. }
        | Command::UnbypassZone { .. }
        | Command::InitialStateDump
        | Command::HostInfo
        | Command::StatusReport => return Err(unsupported(command, dialect)),
    };
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Handler;

    #[test]
    fn test_decode_keypad_update_keeps_commas() {
        let event = decode(
            Dialect::Honeywell,
            "%00,01,1C08,08,00,****DISARMED****  Ready to Arm  $",
            true,
        )
        .unwrap();
        assert_eq!(event.code, "%00");
        assert_eq!(event.data, "01,1C08,08,00,****DISARMED****  Ready to Arm  ");
        assert_eq!(event.handler(), Some(Handler::KeypadUpdate));
    }

    #[test]
    fn test_decode_ack_sentinel() {
        let event = decode(Dialect::Honeywell, "^03,00$", true).unwrap();
        assert_eq!(event.code, "^03");
        assert_eq!(event.data, "00");
        assert_eq!(event.handler(), Some(Handler::CommandResponse));
    }

    #[test]
    fn test_decode_login_text() {
        let event = decode(Dialect::Honeywell, "Login:", false).unwrap();
        assert_eq!(event.code, "Login:");
        assert_eq!(event.data, "");
        assert_eq!(event.handler(), Some(Handler::Login));

        let event = decode(Dialect::Honeywell, "Timed Out!", false).unwrap();
        assert_eq!(event.handler(), Some(Handler::LoginTimeout));
    }

    #[test]
    fn test_decode_unframed_after_login_fails() {
        assert!(matches!(
            decode(Dialect::Honeywell, "garbage", true),
            Err(TpiError::FrameParse { .. })
        ));
    }

    #[test]
    fn test_split_concatenated_frames() {
        let frames = split_frames("%01,0000000000000000$%02,0100000000000000$");
        assert_eq!(frames, vec!["%01,0000000000000000$", "%02,0100000000000000$"]);

        // A terminator not followed by a sentinel does not split.
        let frames = split_frames("%00,01,1C08,08,00,PRICE $5 FIX$");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_encode_keypresses() {
        let lines = encode(
            Dialect::Honeywell,
            &Command::ArmAway {
                code: "1234".into(),
                partition: 1,
            },
        )
        .unwrap();
        assert_eq!(
            lines,
            vec!["^03,1,1$", "^03,1,2$", "^03,1,3$", "^03,1,4$", "^03,1,2$"]
        );
    }

    #[test]
    fn test_encode_login_is_bare() {
        let lines = encode(
            Dialect::Honeywell,
            &Command::Login {
                password: "user".into(),
            },
        )
        .unwrap();
        assert_eq!(lines, vec!["user"]);
    }

    #[test]
    fn test_bypass_requires_uno() {
        assert!(matches!(
            encode(Dialect::Honeywell, &Command::BypassZone { zone: 3 }),
            Err(TpiError::Unsupported { .. })
        ));
        assert_eq!(
            encode(Dialect::Uno, &Command::BypassZone { zone: 3 }).unwrap(),
            vec!["^04,3$"]
        );
        assert_eq!(
            encode(
                Dialect::Uno,
                &Command::Disarm {
                    code: "1234".into(),
                    partition: 1
                }
            )
            .unwrap(),
            vec!["^12,1,1234$"]
        );
    }
}
