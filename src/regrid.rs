use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::GribError;
use crate::registry::ModelDescriptor;

// Callers treat any error as "keep the native-grid file".
pub trait Regridder: Send + Sync {
    fn regrid(&self, model: &ModelDescriptor, input: &Utf8Path) -> Result<Utf8PathBuf, GribError>;
}

#[derive(Debug, Clone)]
pub struct CdoRegridder {
    program: Option<PathBuf>,
    weights_dir: Utf8PathBuf,
}

impl CdoRegridder {
    pub fn new(weights_dir: Utf8PathBuf) -> Self {
        Self::with_program(find_in_path("cdo"), weights_dir)
    }

    pub fn with_program(program: Option<PathBuf>, weights_dir: Utf8PathBuf) -> Self {
        Self {
            program,
            weights_dir,
        }
    }

    pub fn description_file(&self, model: &ModelDescriptor) -> Utf8PathBuf {
        self.weights_dir
            .join(format!("{}_description.txt", model.name))
    }

    pub fn weights_file(&self, model: &ModelDescriptor) -> Utf8PathBuf {
        self.weights_dir.join(format!("{}_weights.nc", model.name))
    }
}

impl Regridder for CdoRegridder {
    fn regrid(&self, model: &ModelDescriptor, input: &Utf8Path) -> Result<Utf8PathBuf, GribError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| GribError::MissingTool("cdo".to_string()))?;
        let description = self.description_file(model);
        let weights = self.weights_file(model);
        for required in [&description, &weights] {
            if !required.as_std_path().exists() {
                return Err(GribError::Regrid(format!("missing {required}")));
            }
        }

        let output = regrid_output_path(input);
        let result = Command::new(program)
            .arg("-f")
            .arg("grb2")
            .arg(format!("remap,{description},{weights}"))
            .arg(input.as_str())
            .arg(output.as_str())
            .output()
            .map_err(|err| GribError::Regrid(err.to_string()))?;
        if !result.status.success() {
            // cdo may have written part of the output before failing.
            if let Err(err) = fs::remove_file(output.as_std_path())
                && err.kind() != io::ErrorKind::NotFound
            {
                warn!("could not remove partial {output}: {err}");
            }
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(GribError::Regrid(if stderr.is_empty() {
                format!("{} exited with {}", program.display(), result.status)
            } else {
                stderr
            }));
        }

        debug!(input = %input, output = %output, "regridded");
        if let Err(err) = fs::remove_file(input.as_std_path()) {
            warn!("could not remove {input} after regrid: {err}");
        }
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegrid;

impl Regridder for NoRegrid {
    fn regrid(
        &self,
        _model: &ModelDescriptor,
        _input: &Utf8Path,
    ) -> Result<Utf8PathBuf, GribError> {
        Err(GribError::Regrid("regridding disabled".to_string()))
    }
}

// `x.grib2` -> `x_regrid.grib2`
pub fn regrid_output_path(input: &Utf8Path) -> Utf8PathBuf {
    let name = input.as_str();
    match name.strip_suffix(".grib2") {
        Some(stem) => Utf8PathBuf::from(format!("{stem}_regrid.grib2")),
        None => Utf8PathBuf::from(format!("{name}_regrid.grib2")),
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let exe = dir.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = dir.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::Provider;
    use crate::registry::Registry;

    #[test]
    fn output_path_appends_regrid_suffix() {
        assert_eq!(
            regrid_output_path(Utf8Path::new("/tmp/gribdl/dwd/icon_T_2M.grib2")),
            Utf8PathBuf::from("/tmp/gribdl/dwd/icon_T_2M_regrid.grib2")
        );
        assert_eq!(
            regrid_output_path(Utf8Path::new("/tmp/raw")),
            Utf8PathBuf::from("/tmp/raw_regrid.grib2")
        );
    }

    #[test]
    fn weights_are_named_after_the_model() {
        let model = Registry::builtin().lookup(Provider::Dwd, "icon").unwrap();
        let regridder = CdoRegridder::with_program(None, Utf8PathBuf::from("weights"));
        assert_eq!(
            regridder.description_file(model),
            Utf8PathBuf::from("weights/icon_description.txt")
        );
        assert_eq!(
            regridder.weights_file(model),
            Utf8PathBuf::from("weights/icon_weights.nc")
        );
    }

    #[test]
    fn missing_cdo_is_reported() {
        let model = Registry::builtin().lookup(Provider::Dwd, "icon").unwrap();
        let regridder = CdoRegridder::with_program(None, Utf8PathBuf::from("weights"));
        let err = regridder
            .regrid(model, Utf8Path::new("/nonexistent/a.grib2"))
            .unwrap_err();
        assert_matches!(err, GribError::MissingTool(_));
    }

    #[test]
    fn missing_weights_are_reported_before_running() {
        let temp = tempfile::tempdir().unwrap();
        let weights = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let model = Registry::builtin().lookup(Provider::Dwd, "icon").unwrap();
        let program = Some(PathBuf::from("/nonexistent/cdo"));
        let regridder = CdoRegridder::with_program(program, weights);
        let err = regridder
            .regrid(model, Utf8Path::new("/nonexistent/a.grib2"))
            .unwrap_err();
        assert_matches!(
            err,
            GribError::Regrid(ref message) if message.contains("icon_description.txt")
        );
    }

    // Writes a partial output, then fails like a cdo run would.
    #[cfg(unix)]
    const FAILING_CDO: &str = "#!/bin/sh
for last; do :; done
echo partial > \"$last\"
echo 'remap failed' >&2
exit 1
";

    #[cfg(unix)]
    #[test]
    fn failed_cdo_run_leaves_no_partial_output() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("icon_description.txt").as_std_path(), b"grid").unwrap();
        fs::write(root.join("icon_weights.nc").as_std_path(), b"weights").unwrap();
        let script = root.join("cdo");
        fs::write(script.as_std_path(), FAILING_CDO).unwrap();
        fs::set_permissions(script.as_std_path(), fs::Permissions::from_mode(0o755)).unwrap();
        let input = root.join("icon_T_2M.grib2");
        fs::write(input.as_std_path(), b"GRIB").unwrap();

        let model = Registry::builtin().lookup(Provider::Dwd, "icon").unwrap();
        let program = Some(script.into_std_path_buf());
        let regridder = CdoRegridder::with_program(program, root);
        let err = regridder.regrid(model, &input).unwrap_err();

        assert_matches!(
            err,
            GribError::Regrid(ref message) if message == "remap failed"
        );
        assert!(!regrid_output_path(&input).as_std_path().exists());
        assert!(input.as_std_path().exists());
    }
}
