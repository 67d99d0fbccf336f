//! Transition settings for source switches.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tarantino_common::error::{TarantinoError, TarantinoResult};

/// How two consecutive composites are blended when the sources change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Switch immediately.
    Cut,
    /// Cross-fade from the previous composite.
    #[default]
    Fade,
    /// Vertical boundary sweeping across the frame.
    Wipe,
}

impl FromStr for TransitionKind {
    type Err = TarantinoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cut" | "none" => Ok(Self::Cut),
            "fade" => Ok(Self::Fade),
            "wipe" => Ok(Self::Wipe),
            other => Err(TarantinoError::config(format!(
                "Unknown transition '{other}' (expected cut, fade, or wipe)"
            ))),
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cut => write!(f, "cut"),
            Self::Fade => write!(f, "fade"),
            Self::Wipe => write!(f, "wipe"),
        }
    }
}

/// Kind and length of the transition armed on a source change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSettings {
    pub kind: TransitionKind,
    /// Length in seconds.
    pub duration_secs: f64,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            duration_secs: 0.5,
        }
    }
}

impl TransitionSettings {
    pub const MAX_DURATION_SECS: f64 = 10.0;

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.clamp(0.0, Self::MAX_DURATION_SECS))
    }

    pub fn validate(&self) -> TarantinoResult<()> {
        if !self.duration_secs.is_finite()
            || self.duration_secs < 0.0
            || self.duration_secs > Self::MAX_DURATION_SECS
        {
            return Err(TarantinoError::config(format!(
                "Transition duration {}s is outside 0..={}",
                self.duration_secs,
                Self::MAX_DURATION_SECS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("Fade".parse::<TransitionKind>().unwrap(), TransitionKind::Fade);
        assert_eq!("wipe".parse::<TransitionKind>().unwrap(), TransitionKind::Wipe);
        assert_eq!("none".parse::<TransitionKind>().unwrap(), TransitionKind::Cut);
        assert!("dissolve".parse::<TransitionKind>().is_err());
    }

    #[test]
    fn validates_duration() {
        let mut settings = TransitionSettings::default();
        settings.validate().unwrap();
        settings.duration_secs = -0.1;
        assert!(settings.validate().is_err());
        settings.duration_secs = f64::NAN;
        assert!(settings.validate().is_err());
    }
}
