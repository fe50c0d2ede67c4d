use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

const DEFAULT_BAUD_RATE: u32 = 9_600;

/// Serial flow-control mode.
#[derive(
    Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FlowControl {
    #[default]
    None,
    RtsCts,
    XonXoff,
}

/// Parameters used to open the instrument connection.
#[derive(Debug, Clone, Eq, PartialEq, Builder, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[builder(into)]
    port: String,
    #[builder(default = DEFAULT_BAUD_RATE)]
    #[serde(default = "default_baud_rate")]
    baud_rate: u32,
    #[builder(default)]
    #[serde(default)]
    flow_control: FlowControl,
    /// Overrides the driver's response window when set.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    response_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Port identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    #[must_use]
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    #[must_use]
    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn builder_applies_serial_defaults() {
        let config = ConnectionConfig::builder().port("/dev/ttyUSB0").build();

        assert_eq!("/dev/ttyUSB0", config.port());
        assert_eq!(9_600, config.baud_rate());
        assert_eq!(FlowControl::None, config.flow_control());
        assert_eq!(None, config.response_timeout());
    }

    #[rstest]
    #[case("none", FlowControl::None)]
    #[case("rts-cts", FlowControl::RtsCts)]
    #[case("xon-xoff", FlowControl::XonXoff)]
    fn flow_control_parses_cli_spelling(#[case] raw: &str, #[case] expected: FlowControl) {
        let parsed: FlowControl = raw.parse().expect("known flow control should parse");
        assert_eq!(expected, parsed);
    }
}
