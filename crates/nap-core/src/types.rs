//! Small enums shared by config parsing, the registries, and the deployment
//! engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How a new image replaces the running fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Stop everything, start the new set. Brief downtime.
    #[default]
    Recreate,
    /// Replace `max_surge` instances at a time behind a health gate.
    Rolling,
    /// Stage a full idle color, then flip routing labels.
    BlueGreen,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Recreate,
        StrategyKind::Rolling,
        StrategyKind::BlueGreen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Recreate => "recreate",
            StrategyKind::Rolling => "rolling",
            StrategyKind::BlueGreen => "blue-green",
        }
    }

    /// Strategies that gate traffic on an HTTP health probe.
    pub fn needs_health_check(&self) -> bool {
        !matches!(self, StrategyKind::Recreate)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recreate" => Ok(StrategyKind::Recreate),
            "rolling" => Ok(StrategyKind::Rolling),
            "blue-green" | "bluegreen" | "blue_green" => Ok(StrategyKind::BlueGreen),
            other => Err(CoreError::Validation(format!(
                "invalid deployment strategy '{other}' (must be recreate, rolling, or blue-green)"
            ))),
        }
    }
}

/// Blue-green environment color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Green,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::Blue => Color::Green,
            Color::Green => Color::Blue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Green => "green",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue" => Ok(Color::Blue),
            "green" => Ok(Color::Green),
            other => Err(CoreError::Validation(format!("invalid color '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_aliases() {
        assert_eq!("blue-green".parse::<StrategyKind>().unwrap(), StrategyKind::BlueGreen);
        assert_eq!("bluegreen".parse::<StrategyKind>().unwrap(), StrategyKind::BlueGreen);
        assert!("canary".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn strategy_serializes_kebab_case() {
        #[derive(Serialize)]
        struct Wrapper {
            strategy: StrategyKind,
        }
        let rendered = toml::to_string(&Wrapper {
            strategy: StrategyKind::BlueGreen,
        })
        .unwrap();
        assert_eq!(rendered.trim(), r#"strategy = "blue-green""#);
    }

    #[test]
    fn colors_flip() {
        assert_eq!(Color::Blue.opposite(), Color::Green);
        assert_eq!(Color::Green.opposite().to_string(), "blue");
    }
}
