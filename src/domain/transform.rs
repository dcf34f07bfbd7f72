// Unit transforms applied to a column before assembly
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitTransform {
    FahrenheitToCelsius,
    Linear {
        scale: f64,
        #[serde(default)]
        offset: f64,
    },
}

impl UnitTransform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnitTransform::FahrenheitToCelsius => (value - 32.0) * 5.0 / 9.0,
            UnitTransform::Linear { scale, offset } => value * scale + offset,
        }
    }
}
