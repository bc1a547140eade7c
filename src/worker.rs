use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{GribError, Stage, UnitFailure};
use crate::http::{HttpSource, STATUS_OK, STATUS_PARTIAL_CONTENT};
use crate::index::ByteRange;
use crate::registry::ModelDescriptor;
use crate::regrid::Regridder;
use crate::store::{Store, archive_basename};

const COPY_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(200))
    }
}

// Each attempt starts over from scratch; only transient errors are retried.
pub fn with_retries<T, F>(
    policy: &RetryPolicy,
    stage: Stage,
    url: &str,
    mut op: F,
) -> Result<T, GribError>
where
    F: FnMut() -> Result<T, GribError>,
{
    let mut retry = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retry < policy.retries => {
                retry += 1;
                warn!(
                    "{} retrying ({retry}/{}) {url}: {err}",
                    stage.tag(),
                    policy.retries
                );
                thread::sleep(policy.delay(retry));
            }
            Err(err) => return Err(err),
        }
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bzip2,
    Gzip,
    Identity,
}

impl Compression {
    pub fn from_url(url: &str) -> Self {
        let name = archive_basename(url);
        if name.ends_with(".bz2") {
            Compression::Bzip2
        } else if name.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::Identity
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Compression::Bzip2 => ".bz2",
            Compression::Gzip => ".gz",
            Compression::Identity => "",
        }
    }

    fn decoder<'a>(self, reader: Box<dyn Read + Send + 'a>) -> Box<dyn Read + 'a> {
        match self {
            Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            Compression::Identity => reader,
        }
    }
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUnit {
    pub param: String,
    pub step: u32,
    pub height: Option<String>,
    pub url: String,
    pub range: Option<ByteRange>,
}

impl FetchUnit {
    pub fn archive(param: &str, step: u32, url: String) -> Self {
        Self {
            param: param.to_string(),
            step,
            height: None,
            url,
            range: None,
        }
    }

    pub fn ranged(param: &str, step: u32, height: &str, url: &str, range: ByteRange) -> Self {
        Self {
            param: param.to_string(),
            step,
            height: Some(height.to_string()),
            url: url.to_string(),
            range: Some(range),
        }
    }

    fn fail(&self, stage: Stage, err: GribError) -> UnitFailure {
        UnitFailure::new(stage, &self.url, Some(&self.param), self.step, err)
    }
}

// Read failures are transient body errors, write failures are local.
pub fn copy_body(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64, GribError> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(GribError::BodyRead(err.to_string())),
        };
        writer
            .write_all(&buf[..n])
            .map_err(|err| GribError::Filesystem(err.to_string()))?;
        total += n as u64;
    }
    writer
        .flush()
        .map_err(|err| GribError::Filesystem(err.to_string()))?;
    Ok(total)
}
pub struct Worker<'a> {
    source: &'a dyn HttpSource,
    regridder: &'a dyn Regridder,
    store: &'a Store,
    retry: RetryPolicy,
    regrid: bool,
}

impl<'a> Worker<'a> {
    pub fn new(
        source: &'a dyn HttpSource,
        regridder: &'a dyn Regridder,
        store: &'a Store,
        retry: RetryPolicy,
        regrid: bool,
    ) -> Self {
        Self {
            source,
            regridder,
            store,
            retry,
            regrid,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn source(&self) -> &'a dyn HttpSource {
        self.source
    }
    pub fn land_archive(
        &self,
        model: &ModelDescriptor,
        unit: &FetchUnit,
    ) -> Result<Utf8PathBuf, UnitFailure> {
        let compression = Compression::from_url(&unit.url);
        let basename = archive_basename(&unit.url);
        let file_name = basename
            .strip_suffix(compression.suffix())
            .unwrap_or(basename);

        self.store
            .ensure_staging_root()
            .map_err(|err| unit.fail(Stage::Download, err))?;
        let scratch = with_retries(&self.retry, Stage::Download, &unit.url, || {
            self.download_decoded(&unit.url, compression)
        })
        .map_err(|err| unit.fail(Stage::Download, err))?;

        let mut staged = self.store.staging_path(file_name);
        Store::persist(scratch, &staged).map_err(|err| unit.fail(Stage::Download, err))?;
        debug!(path = %staged, "staged");

        if self.regrid && model.grid().is_some_and(|grid| grid.needs_regrid()) {
            match self.regridder.regrid(model, &staged) {
                Ok(path) => staged = path,
                Err(err) => warn!("regrid of {staged} failed, keeping native grid: {err}"),
            }
        }

        self.store
            .move_into_output(&staged)
            .map_err(|err| unit.fail(Stage::Move, err))
    }

    fn download_decoded(
        &self,
        url: &str,
        compression: Compression,
    ) -> Result<NamedTempFile, GribError> {
        let body = self.source.get(url, None)?.expect_status(url, STATUS_OK)?;
        let mut scratch = self.store.staging_scratch()?;
        let mut reader = compression.decoder(body.reader);
        let bytes = copy_body(&mut reader, scratch.as_file_mut())?;
        debug!(url, bytes, "downloaded");
        Ok(scratch)
    }

    // Lands as `<output>/<archive>_<param>_<height>.grib2`.
    pub fn land_range(&self, unit: &FetchUnit) -> Result<Utf8PathBuf, UnitFailure> {
        let (Some(range), Some(height)) = (unit.range, unit.height.as_deref()) else {
            return Err(unit.fail(
                Stage::Download,
                GribError::Index("unit carries no byte range".to_string()),
            ));
        };
        let dest = self.store.output_path(&format!(
            "{}_{}_{}.grib2",
            archive_basename(&unit.url),
            unit.param,
            height
        ));

        self.store
            .ensure_output_root()
            .map_err(|err| unit.fail(Stage::Download, err))?;
        let scratch = with_retries(&self.retry, Stage::Download, &unit.url, || {
            let body = self
                .source
                .get(&unit.url, Some(range))?
                .expect_status(&unit.url, STATUS_PARTIAL_CONTENT)?;
            let mut scratch = self.store.output_scratch()?;
            let mut reader = body.reader;
            copy_body(&mut reader, scratch.as_file_mut())?;
            Ok(scratch)
        })
        .map_err(|err| unit.fail(Stage::Download, err))?;

        Store::persist(scratch, &dest).map_err(|err| unit.fail(Stage::Move, err))?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn no_delay(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::ZERO)
    }

    #[test]
    fn transient_errors_use_the_whole_budget() {
        let calls = Cell::new(0u32);
        let result: Result<(), GribError> = with_retries(&no_delay(5), Stage::Download, "u", || {
            calls.set(calls.get() + 1);
            Err(GribError::Http("connection refused".to_string()))
        });
        assert_matches!(result, Err(GribError::Http(_)));
        assert_eq!(calls.get(), 6);
    }

    #[test]
    fn local_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let result: Result<(), GribError> = with_retries(&no_delay(5), Stage::Download, "u", || {
            calls.set(calls.get() + 1);
            Err(GribError::Filesystem("read-only".to_string()))
        });
        assert_matches!(result, Err(GribError::Filesystem(_)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recovers_after_transient_failure() {
        let calls = Cell::new(0u32);
        let result = with_retries(&no_delay(2), Stage::Download, "u", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(GribError::BodyRead("eof".to_string()))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn compression_follows_suffix() {
        assert_eq!(Compression::from_url("https://h/a.bz2"), Compression::Bzip2);
        assert_eq!(Compression::from_url("https://h/a.gz"), Compression::Gzip);
        assert_eq!(
            Compression::from_url("https://h/gfs.t00z.pgrb2.0p25.f003"),
            Compression::Identity
        );
    }

    #[test]
    fn gzip_archives_are_decoded() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(b"GRIB payload").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut reader = Compression::Gzip.decoder(Box::new(io::Cursor::new(compressed)));
        let mut out = Vec::new();
        copy_body(&mut reader, &mut out).unwrap();
        assert_eq!(out, b"GRIB payload");
    }

    #[test]
    fn copy_body_separates_read_and_write_failures() {
        let mut sink = Vec::new();
        assert_matches!(
            copy_body(&mut FailingReader, &mut sink),
            Err(GribError::BodyRead(_))
        );
        let mut source: &[u8] = b"payload";
        assert_matches!(
            copy_body(&mut source, &mut FailingWriter),
            Err(GribError::Filesystem(_))
        );
        let mut source: &[u8] = b"payload";
        assert_eq!(copy_body(&mut source, &mut sink).unwrap(), 7);
        assert_eq!(sink, b"payload");
    }
}
