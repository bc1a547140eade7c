use std::fs;

use camino::Utf8PathBuf;

use gribdl::store::{Store, archive_basename};

#[test]
fn layout_paths() {
    let store = Store::new_with_paths(
        Utf8PathBuf::from("output"),
        Utf8PathBuf::from("/tmp/gribdl/dwd"),
    );
    let file = "icon-eu_europe_regular-lat-lon_single-level_2024030103_004_T_2M.grib2.bz2";
    let url = format!("https://opendata.dwd.de/icon-eu/grib/03/{file}");
    assert_eq!(archive_basename(&url), file);
    assert!(store.output_path("a.grib2").ends_with("output/a.grib2"));
    assert!(
        store
            .staging_path("a.grib2")
            .starts_with(store.staging_root())
    );
}

#[test]
fn copy_file_atomic_creates_parents_and_replaces() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let source = root.join("src.grib2");
    let dest = root.join("nested/dir/dest.grib2");
    fs::write(source.as_std_path(), b"one").unwrap();

    Store::copy_file_atomic(&source, &dest).unwrap();
    assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"one");

    fs::write(source.as_std_path(), b"two").unwrap();
    Store::copy_file_atomic(&source, &dest).unwrap();
    assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"two");
    assert!(source.as_std_path().exists());

    let leftovers = fs::read_dir(root.join("nested/dir").as_std_path())
        .unwrap()
        .count();
    assert_eq!(leftovers, 1);
}
