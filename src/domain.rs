use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::GribError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    // Whole archives per parameter and step.
    Dwd,
    // Combined archives addressed by byte range.
    Noaa,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Dwd => "dwd",
            Provider::Noaa => "noaa",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GribError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dwd" => Ok(Provider::Dwd),
            "noaa" => Ok(Provider::Noaa),
            other => Err(GribError::InvalidConfig(format!(
                "unrecognized provider {other}, expected dwd or noaa"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grid {
    Icosahedral,
    RegularLatLon,
}

impl Grid {
    pub fn as_str(self) -> &'static str {
        match self {
            Grid::Icosahedral => "icosahedral",
            Grid::RegularLatLon => "regular-lat-lon",
        }
    }

    pub fn needs_regrid(self) -> bool {
        !matches!(self, Grid::RegularLatLon)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Trimmed and deduplicated in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamList(Vec<String>);

impl ParamList {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

impl FromStr for ParamList {
    type Err = GribError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut params: Vec<String> = Vec::new();
        for item in value.split(',') {
            let item = item.trim();
            if item.is_empty() || params.iter().any(|existing| existing == item) {
                continue;
            }
            if item.contains(['/', '\\']) {
                return Err(GribError::InvalidParameterList(format!(
                    "parameter {item} contains a path separator"
                )));
            }
            params.push(item.to_string());
        }
        if params.is_empty() {
            return Err(GribError::InvalidParameterList(value.to_string()));
        }
        Ok(Self(params))
    }
}
