//! Card styling per alarm state.

use std::fmt;

use serde::Serialize;

/// Presentation of one alarm state: icon, adaptive-card colour and title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateStyle {
    /// Emoji shown before the title.
    pub icon: &'static str,
    /// Adaptive card colour name for the state block.
    pub colour: &'static str,
    /// Card title.
    pub title: &'static str,
}

/// Style for alarms entering `ALARM`.
pub const ALARM_STYLE: StateStyle = StateStyle {
    icon: "🚨",
    colour: "Attention",
    title: "Alarm Triggered",
};

/// Style for alarms returning to `OK`.
pub const OK_STYLE: StateStyle = StateStyle {
    icon: "✅",
    colour: "Good",
    title: "Alarm Resolved",
};

/// Style for alarms entering `INSUFFICIENT_DATA`.
pub const INSUFFICIENT_DATA_STYLE: StateStyle = StateStyle {
    icon: "⚠️",
    colour: "Warning",
    title: "Alarm State Uncertain",
};

/// Style for any state not listed above.
pub const DEFAULT_STYLE: StateStyle = StateStyle {
    icon: "❓",
    colour: "Default",
    title: "Alarm State Changed",
};

/// The alarm states with dedicated styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmState {
    /// The metric breached its threshold.
    Alarm,
    /// The metric is within its threshold.
    Ok,
    /// Not enough data to evaluate the alarm.
    InsufficientData,
}

impl AlarmState {
    /// Parses an upper-cased state value.
    #[must_use]
    pub fn parse(state: &str) -> Option<Self> {
        match state {
            "ALARM" => Some(Self::Alarm),
            "OK" => Some(Self::Ok),
            "INSUFFICIENT_DATA" => Some(Self::InsufficientData),
            _ => None,
        }
    }

    /// Returns the wire name of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alarm => "ALARM",
            Self::Ok => "OK",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }

    /// Returns the styling for this state.
    #[must_use]
    pub const fn style(&self) -> &'static StateStyle {
        match self {
            Self::Alarm => &ALARM_STYLE,
            Self::Ok => &OK_STYLE,
            Self::InsufficientData => &INSUFFICIENT_DATA_STYLE,
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateStyle {
    /// Looks up the style for a known state.
    #[must_use]
    pub fn for_state(state: &str) -> Option<&'static Self> {
        AlarmState::parse(state).map(|s| s.style())
    }

    /// Looks up the style for a state, using [`DEFAULT_STYLE`] for unknown ones.
    #[must_use]
    pub fn resolve(state: &str) -> &'static Self {
        Self::for_state(state).unwrap_or(&DEFAULT_STYLE)
    }
}
