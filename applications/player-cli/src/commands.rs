//! Interactive transport commands read from stdin

use crate::error::{PlayerError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// One line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Resume,
    Stop,
    Seek(Duration),
    /// Set one band: index and gain in dB
    Eq(usize, f32),
    Preset(String),
    Volume(u8),
    Mute(bool),
    Next(PathBuf),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play | pause | resume | stop
  seek <seconds|m:ss>      jump to a position
  eq <band 0-9> <dB>       set one equalizer band
  preset <name>            load a preset
  vol <0-100>              set volume
  mute | unmute
  next <file>              load another track
  status                   show position and state
  quit";

impl std::str::FromStr for Command {
    type Err = PlayerError;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(PlayerError::InvalidCommand("empty line".to_string()));
        };
        let rest: Vec<&str> = words.collect();
        let arg = |i: usize| {
            rest.get(i)
                .copied()
                .ok_or_else(|| PlayerError::InvalidCommand(format!("'{verb}' needs an argument")))
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "play" | "p" => Command::Play,
            "pause" => Command::Pause,
            "resume" | "r" => Command::Resume,
            "stop" => Command::Stop,
            "seek" => Command::Seek(parse_position(arg(0)?)?),
            "eq" => {
                let band = arg(0)?
                    .parse()
                    .map_err(|_| PlayerError::InvalidCommand(format!("bad band '{}'", rest[0])))?;
                let gain = arg(1)?
                    .parse()
                    .map_err(|_| PlayerError::InvalidCommand(format!("bad gain '{}'", rest[1])))?;
                Command::Eq(band, gain)
            }
            "preset" => {
                arg(0)?;
                Command::Preset(rest.join(" "))
            }
            "vol" | "volume" => {
                let level: u8 = arg(0)?
                    .parse()
                    .map_err(|_| PlayerError::InvalidCommand(format!("bad volume '{}'", rest[0])))?;
                Command::Volume(level.min(100))
            }
            "mute" => Command::Mute(true),
            "unmute" => Command::Mute(false),
            "next" | "n" => {
                arg(0)?;
                Command::Next(PathBuf::from(rest.join(" ")))
            }
            "status" | "s" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => {
                return Err(PlayerError::InvalidCommand(format!(
                    "unknown command '{other}' (try 'help')"
                )))
            }
        };
        Ok(command)
    }
}

/// Parse `90`, `90.5` or `1:30` into a position
pub fn parse_position(text: &str) -> Result<Duration> {
    let bad = || PlayerError::InvalidCommand(format!("bad position '{text}'"));
    let seconds = match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes.parse().map_err(|_| bad())?;
            let seconds: f64 = seconds.parse().map_err(|_| bad())?;
            minutes as f64 * 60.0 + seconds
        }
        None => text.parse().map_err(|_| bad())?,
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(bad());
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// `m:ss.s` for display
pub fn format_position(position: Duration) -> String {
    let total = position.as_secs_f64();
    let minutes = (total / 60.0).floor() as u64;
    format!("{}:{:04.1}", minutes, total - minutes as f64 * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_commands() {
        assert_eq!("pause".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!("  Resume ".parse::<Command>().unwrap(), Command::Resume);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn parses_arguments() {
        assert_eq!(
            "seek 1:30".parse::<Command>().unwrap(),
            Command::Seek(Duration::from_secs(90))
        );
        assert_eq!("eq 3 -4.5".parse::<Command>().unwrap(), Command::Eq(3, -4.5));
        assert_eq!(
            "preset bass boost".parse::<Command>().unwrap(),
            Command::Preset("bass boost".to_string())
        );
        assert_eq!("vol 250".parse::<Command>().unwrap(), Command::Volume(100));
        assert_eq!(
            "next /music/two.flac".parse::<Command>().unwrap(),
            Command::Next(PathBuf::from("/music/two.flac"))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!("".parse::<Command>().is_err());
        assert!("seek".parse::<Command>().is_err());
        assert!("seek -3".parse::<Command>().is_err());
        assert!("eq x 3".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[test]
    fn formats_positions() {
        assert_eq!(format_position(Duration::from_millis(95_300)), "1:35.3");
        assert_eq!(format_position(Duration::ZERO), "0:00.0");
    }
}
