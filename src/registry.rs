use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::domain::{Grid, Provider};
use crate::error::GribError;
use crate::template::UrlTemplate;

const DWD_SINGLE_LEVEL: &str = "https://opendata.dwd.de/weather/nwp/%sL/grib/%s/%sL/%sL_%s_%s_single-level_%s%s_%s_%sU.grib2.bz2";
const DWD_D2_SINGLE_LEVEL: &str = "https://opendata.dwd.de/weather/nwp/%sL/grib/%s/%sL/%sL_%s_%s_single-level_%s%s_%s_2d_%sL.grib2.bz2";
const NOAA_GFS: &str =
    "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.%s/%s/atmos/gfs.t%sz.pgrb2.%s.f%s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFields {
    Dwd { grid: Grid, area: &'static str },
    Noaa { resolution: &'static str },
}

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub provider: Provider,
    pub name: &'static str,
    pub publication_delay_minutes: i64,
    pub run_interval_hours: u32,
    // Run hours missing here are not published.
    pub step_caps: BTreeMap<u32, u32>,
    pub breakpoint: u32,
    pub url_template: UrlTemplate,
    pub fields: ProviderFields,
}

impl ModelDescriptor {
    pub fn step_cap(&self, run_hour: u32) -> Option<u32> {
        self.step_caps.get(&run_hour).copied()
    }

    pub fn grid(&self) -> Option<Grid> {
        match self.fields {
            ProviderFields::Dwd { grid, .. } => Some(grid),
            ProviderFields::Noaa { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<ModelDescriptor>,
}

impl Registry {
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    pub fn builtin() -> &'static Registry {
        static BUILTIN: OnceLock<Registry> = OnceLock::new();
        BUILTIN.get_or_init(|| Registry::new(builtin_models()))
    }

    pub fn lookup(&self, provider: Provider, name: &str) -> Result<&ModelDescriptor, GribError> {
        self.models
            .iter()
            .find(|model| model.provider == provider && model.name == name)
            .ok_or_else(|| GribError::UnsupportedModel {
                provider: provider.to_string(),
                name: name.to_string(),
                supported: self.supported(provider),
            })
    }

    pub fn supported(&self, provider: Provider) -> Vec<String> {
        self.models
            .iter()
            .filter(|model| model.provider == provider)
            .map(|model| model.name.to_string())
            .collect()
    }
}

fn caps(entries: &[(u32, u32)]) -> BTreeMap<u32, u32> {
    entries.iter().copied().collect()
}

fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            provider: Provider::Dwd,
            name: "icon",
            publication_delay_minutes: 240,
            run_interval_hours: 6,
            step_caps: caps(&[(0, 180), (6, 120), (12, 180), (18, 120)]),
            breakpoint: 78,
            url_template: UrlTemplate::parse(DWD_SINGLE_LEVEL),
            fields: ProviderFields::Dwd {
                grid: Grid::Icosahedral,
                area: "global",
            },
        },
        ModelDescriptor {
            provider: Provider::Dwd,
            name: "icon-d2",
            publication_delay_minutes: 540,
            run_interval_hours: 12,
            step_caps: caps(&[(0, 180), (6, 120), (12, 180), (18, 120)]),
            breakpoint: 24,
            url_template: UrlTemplate::parse(DWD_D2_SINGLE_LEVEL),
            fields: ProviderFields::Dwd {
                grid: Grid::Icosahedral,
                area: "germany",
            },
        },
        ModelDescriptor {
            provider: Provider::Dwd,
            name: "icon-eu",
            publication_delay_minutes: 240,
            run_interval_hours: 3,
            step_caps: caps(&[
                (0, 120),
                (3, 30),
                (6, 120),
                (9, 30),
                (12, 120),
                (15, 30),
                (18, 120),
                (21, 30),
            ]),
            breakpoint: 78,
            url_template: UrlTemplate::parse(DWD_SINGLE_LEVEL),
            fields: ProviderFields::Dwd {
                grid: Grid::RegularLatLon,
                area: "europe",
            },
        },
        ModelDescriptor {
            provider: Provider::Noaa,
            name: "gfs",
            publication_delay_minutes: 360,
            run_interval_hours: 6,
            step_caps: caps(&[(0, 384), (6, 384), (12, 384), (18, 384)]),
            breakpoint: 120,
            url_template: UrlTemplate::parse(NOAA_GFS),
            fields: ProviderFields::Noaa { resolution: "0p25" },
        },
    ]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn lookup_known_models() {
        let registry = Registry::builtin();
        let model = registry.lookup(Provider::Dwd, "icon-eu").unwrap();
        assert_eq!(model.run_interval_hours, 3);
        assert_eq!(model.grid(), Some(Grid::RegularLatLon));
        assert!(registry.lookup(Provider::Noaa, "gfs").is_ok());
    }

    #[test]
    fn lookup_is_scoped_by_provider() {
        let err = Registry::builtin()
            .lookup(Provider::Noaa, "icon")
            .unwrap_err();
        assert_matches!(
            err,
            GribError::UnsupportedModel { ref supported, .. } if supported == &["gfs"]
        );
    }

    #[test]
    fn every_run_hour_has_a_cap() {
        for model in &Registry::builtin().models {
            assert_eq!(24 % model.run_interval_hours, 0, "{}", model.name);
            for hour in (0..24).step_by(model.run_interval_hours as usize) {
                assert!(
                    model.step_cap(hour).is_some(),
                    "{} has no cap for {hour}Z",
                    model.name
                );
            }
        }
    }

    #[test]
    fn template_arity_matches_provider() {
        for model in &Registry::builtin().models {
            let expected = match model.fields {
                ProviderFields::Dwd { .. } => 10,
                ProviderFields::Noaa { .. } => 5,
            };
            assert_eq!(model.url_template.slot_count(), expected, "{}", model.name);
        }
    }
}
