use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};

use gribdl::clock::most_recent_run;
use gribdl::domain::Provider;
use gribdl::error::GribError;
use gribdl::plan::plan;
use gribdl::registry::Registry;
use gribdl::template::archive_url;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[test]
fn icon_d2_run_and_long_plan() {
    let registry = Registry::builtin();
    let model = registry.lookup(Provider::Dwd, "icon-d2").unwrap();
    let run = most_recent_run(model, at(2024, 3, 1, 23, 0));
    assert_eq!(run.to_string(), "2024-03-01T12:00:00Z");

    let steps = plan(model, run.hour(), 1000).unwrap();
    assert_eq!(steps.last(), Some(180));
    assert_eq!(steps.len(), 24 + ((180 - 24) / 3 + 1));
    assert_eq!(
        archive_url(model, "t_2m", &run, 24),
        "https://opendata.dwd.de/weather/nwp/icon-d2/grib/12/t_2m/icon-d2_germany_icosahedral_single-level_2024030112_024_2d_t_2m.grib2.bz2"
    );
}

#[test]
fn icon_archive_urls_follow_the_open_data_layout() {
    let registry = Registry::builtin();
    let icon_eu = registry.lookup(Provider::Dwd, "icon-eu").unwrap();
    let run = most_recent_run(icon_eu, at(2024, 3, 1, 7, 59));
    assert_eq!(
        archive_url(icon_eu, "t_2m", &run, 4),
        "https://opendata.dwd.de/weather/nwp/icon-eu/grib/03/t_2m/icon-eu_europe_regular-lat-lon_single-level_2024030103_004_T_2M.grib2.bz2"
    );

    let icon = registry.lookup(Provider::Dwd, "icon").unwrap();
    let run = most_recent_run(icon, at(2024, 3, 1, 10, 30));
    assert_eq!(
        archive_url(icon, "clct", &run, 1),
        "https://opendata.dwd.de/weather/nwp/icon/grib/06/clct/icon_global_icosahedral_single-level_2024030106_001_CLCT.grib2.bz2"
    );
}

#[test]
fn icon_eu_off_hour_runs_are_short() {
    let registry = Registry::builtin();
    let model = registry.lookup(Provider::Dwd, "icon-eu").unwrap();
    let run = most_recent_run(model, at(2024, 3, 1, 13, 0));
    assert_eq!(run.hour(), 9);
    let steps = plan(model, run.hour(), 100).unwrap();
    assert_eq!(steps.steps(), (0..30).collect::<Vec<u32>>().as_slice());
}

#[test]
fn gfs_archive_url_follows_the_bucket_layout() {
    let registry = Registry::builtin();
    let model = registry.lookup(Provider::Noaa, "gfs").unwrap();
    let run = most_recent_run(model, at(2024, 3, 1, 2, 30));
    assert_eq!(run.to_string(), "2024-02-29T18:00:00Z");
    assert_eq!(
        archive_url(model, "ignored", &run, 7),
        "https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.20240229/18/atmos/gfs.t18z.pgrb2.0p25.f007"
    );
}

#[test]
fn unpublished_run_hour_is_rejected() {
    let registry = Registry::builtin();
    let model = registry.lookup(Provider::Dwd, "icon").unwrap();
    assert_matches!(
        plan(model, 3, 10),
        Err(GribError::UnpublishedRunHour { hour: 3, .. })
    );
}
