use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One tracked environmental metric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Temperature,
    Humidity,
    Pressure,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Temperature, Field::Humidity, Field::Pressure];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Temperature => "temperature",
            Field::Humidity => "humidity",
            Field::Pressure => "pressure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Temperature => "Temperature",
            Field::Humidity => "Humidity",
            Field::Pressure => "Pressure",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Field::Temperature => "°C",
            Field::Humidity => "%",
            Field::Pressure => "hPa",
        }
    }

    /// Line colour used by the chart renderer, as `(r, g, b)`.
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            Field::Temperature => (239, 68, 68),
            Field::Humidity => (59, 130, 246),
            Field::Pressure => (16, 185, 129),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown field '{0}' (expected temperature, humidity or pressure)")]
pub struct UnknownField(pub String);

impl FromStr for Field {
    type Err = UnknownField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(Field::Temperature),
            "humidity" => Ok(Field::Humidity),
            "pressure" => Ok(Field::Pressure),
            other => Err(UnknownField(other.to_string())),
        }
    }
}

/// A value per tracked field. Every field always has a slot, so lookups are
/// exhaustive and never miss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap<T> {
    pub temperature: T,
    pub humidity: T,
    pub pressure: T,
}

impl<T> FieldMap<T> {
    pub fn from_fn(mut f: impl FnMut(Field) -> T) -> Self {
        Self {
            temperature: f(Field::Temperature),
            humidity: f(Field::Humidity),
            pressure: f(Field::Pressure),
        }
    }

    pub fn get(&self, field: Field) -> &T {
        match field {
            Field::Temperature => &self.temperature,
            Field::Humidity => &self.humidity,
            Field::Pressure => &self.pressure,
        }
    }

    pub fn get_mut(&mut self, field: Field) -> &mut T {
        match field {
            Field::Temperature => &mut self.temperature,
            Field::Humidity => &mut self.humidity,
            Field::Pressure => &mut self.pressure,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Field, T) -> U) -> FieldMap<U> {
        FieldMap {
            temperature: f(Field::Temperature, self.temperature),
            humidity: f(Field::Humidity, self.humidity),
            pressure: f(Field::Pressure, self.pressure),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &T)> {
        Field::ALL.into_iter().map(move |field| (field, self.get(field)))
    }
}
