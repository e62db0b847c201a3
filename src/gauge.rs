use std::fmt;

use serde::Serialize;

/// Five-band palette, worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeColor {
    Red,
    Orange,
    Gold,
    Green,
    Blue,
}

const PALETTE: [GaugeColor; 5] = [
    GaugeColor::Red,
    GaugeColor::Orange,
    GaugeColor::Gold,
    GaugeColor::Green,
    GaugeColor::Blue,
];

impl GaugeColor {
    pub fn hex(self) -> &'static str {
        match self {
            GaugeColor::Red => "#e53935",
            GaugeColor::Orange => "#fb8c00",
            GaugeColor::Gold => "#fdd835",
            GaugeColor::Green => "#43a047",
            GaugeColor::Blue => "#1e88e5",
        }
    }
}

impl fmt::Display for GaugeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GaugeColor::Red => "red",
            GaugeColor::Orange => "orange",
            GaugeColor::Gold => "gold",
            GaugeColor::Green => "green",
            GaugeColor::Blue => "blue",
        };
        f.write_str(label)
    }
}

/// Higher-is-better bands; `thresholds` ascending.
pub fn color_for(value: f64, thresholds: [f64; 4]) -> GaugeColor {
    let band = thresholds
        .iter()
        .take_while(|threshold| value >= **threshold)
        .count();
    PALETTE[band]
}

/// Lower-is-better bands; `thresholds` descending.
pub fn color_for_inverted(value: f64, thresholds: [f64; 4]) -> GaugeColor {
    let band = thresholds
        .iter()
        .take_while(|threshold| value <= **threshold)
        .count();
    PALETTE[band]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gauge {
    pub label: &'static str,
    pub unit: &'static str,
    pub thresholds: [f64; 4],
    pub lower_is_better: bool,
}

impl Gauge {
    pub fn color(&self, value: f64) -> GaugeColor {
        if self.lower_is_better {
            color_for_inverted(value, self.thresholds)
        } else {
            color_for(value, self.thresholds)
        }
    }
}

pub const DIALS_PER_HOUR: Gauge = Gauge {
    label: "Dials / hour",
    unit: "",
    thresholds: [20.0, 30.0, 40.0, 50.0],
    lower_is_better: false,
};

pub const HORSEPOWER: Gauge = Gauge {
    label: "Horsepower",
    unit: "",
    thresholds: [40.0, 55.0, 70.0, 85.0],
    lower_is_better: false,
};

pub const CONNECTION_RATE: Gauge = Gauge {
    label: "Connection rate",
    unit: "%",
    thresholds: [20.0, 30.0, 40.0, 50.0],
    lower_is_better: false,
};

pub const PITCH_RATE: Gauge = Gauge {
    label: "Pitch rate",
    unit: "%",
    thresholds: [40.0, 55.0, 70.0, 85.0],
    lower_is_better: false,
};

pub const CONVERSION_RATE: Gauge = Gauge {
    label: "Conversion rate",
    unit: "%",
    thresholds: [10.0, 20.0, 30.0, 40.0],
    lower_is_better: false,
};

pub const GROSS_ISSUE: Gauge = Gauge {
    label: "Gross issue rate",
    unit: "%",
    thresholds: [40.0, 55.0, 70.0, 85.0],
    lower_is_better: false,
};

pub const SCORECARD: Gauge = Gauge {
    label: "Scorecard",
    unit: "%",
    thresholds: [60.0, 70.0, 80.0, 90.0],
    lower_is_better: false,
};

pub const SKILL_SCORE: Gauge = Gauge {
    label: "Skill score",
    unit: "",
    thresholds: [50.0, 65.0, 75.0, 90.0],
    lower_is_better: false,
};

/// Seconds; a slow checkout-to-dial is the red end.
pub const CHECKOUT_TO_DIAL: Gauge = Gauge {
    label: "Checkout to dial",
    unit: "s",
    thresholds: [600.0, 300.0, 120.0, 60.0],
    lower_is_better: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    const BANDS: [f64; 4] = [10.0, 20.0, 30.0, 40.0];

    #[test]
    fn bands_are_half_open_from_below() {
        assert_eq!(color_for(9.9, BANDS), GaugeColor::Red);
        assert_eq!(color_for(10.0, BANDS), GaugeColor::Orange);
        assert_eq!(color_for(25.0, BANDS), GaugeColor::Gold);
        assert_eq!(color_for(30.0, BANDS), GaugeColor::Green);
        assert_eq!(color_for(40.0, BANDS), GaugeColor::Blue);
        assert_eq!(color_for(400.0, BANDS), GaugeColor::Blue);
    }

    #[test]
    fn inverted_bands_reward_small_values() {
        let thresholds = CHECKOUT_TO_DIAL.thresholds;
        assert_eq!(color_for_inverted(900.0, thresholds), GaugeColor::Red);
        assert_eq!(color_for_inverted(600.0, thresholds), GaugeColor::Orange);
        assert_eq!(color_for_inverted(200.0, thresholds), GaugeColor::Gold);
        assert_eq!(color_for_inverted(90.0, thresholds), GaugeColor::Green);
        assert_eq!(color_for_inverted(30.0, thresholds), GaugeColor::Blue);
        assert_eq!(CHECKOUT_TO_DIAL.color(30.0), GaugeColor::Blue);
    }

    #[test]
    fn colors_rank_low_to_high() {
        assert!(GaugeColor::Red < GaugeColor::Blue);
        assert_eq!(GaugeColor::Gold.to_string(), "gold");
    }
}
