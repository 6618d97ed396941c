/// ARGO profile file ingestor
///
/// Reads NetCDF-3 classic profile files (the ARGO core format) from a
/// directory and inserts one relational row per measurement cycle. Each
/// row's pressure/temperature/salinity scalar is the mean of the valid
/// elements of that cycle's vertical profile, or NULL when the whole
/// profile is fill.
///
/// Error isolation matches the batch-job contract: a bad cycle is logged
/// and skipped, a bad file is logged and skipped, and nothing is retried.
/// Re-running over the same files inserts duplicate rows.

use std::path::Path;

use chrono::{DateTime, Utc};
use netcdf3::{DataVector, FileReader};

use crate::errors::ArgoError;
use crate::store::{NewProfile, ProfileStore};

/// Fill marker for PRES/TEMP/PSAL per the ARGO user manual (99999.0).
/// Compared with a margin so f32-decoded fills and variants like 99999.99
/// are caught too; no real ocean measurement approaches this magnitude.
const PROFILE_FILL_THRESHOLD: f64 = 99_990.0;

/// Fill marker for JULD (999999.0), same margin reasoning.
const JULD_FILL_THRESHOLD: f64 = 999_990.0;

/// ARGO reference epoch 1950-01-01T00:00:00Z as a Unix timestamp.
/// JULD is days (fractional) since this instant.
const JULD_EPOCH_SECS: i64 = -631_152_000;

/// Counters reported after an ingest run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub rows_inserted: u64,
    pub cycles_skipped: u64,
}

/// Decoded contents of one profile file: per-cycle arrays plus the
/// flattened N_PROF x N_LEVELS measurement profiles.
#[derive(Debug)]
struct FloatFile {
    platform_id: String,
    cycle_numbers: Vec<f64>,
    julds: Vec<f64>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
    pressure: Vec<f64>,
    temperature: Vec<f64>,
    salinity: Vec<f64>,
}

impl FloatFile {
    fn cycle_count(&self) -> usize {
        self.cycle_numbers.len()
    }

    /// Check every array length against the cycle count and derive the
    /// levels per cycle from the flattened profile length. The cycle loop
    /// indexes these arrays by cycle, so a file whose variables decoded to
    /// mismatched lengths must be rejected here, before any row is built.
    fn validate(&self) -> Result<usize, ArgoError> {
        let n_prof = self.cycle_count();

        let per_cycle = [
            ("JULD", self.julds.len()),
            ("LATITUDE", self.latitudes.len()),
            ("LONGITUDE", self.longitudes.len()),
        ];
        for (name, len) in per_cycle {
            if len != n_prof {
                return Err(ArgoError::Ingest(format!(
                    "{} has {} entries for {} cycles",
                    name, len, n_prof
                )));
            }
        }

        if n_prof == 0 {
            return Ok(0);
        }
        if self.pressure.len() % n_prof != 0 {
            return Err(ArgoError::Ingest(format!(
                "Profile array length {} is not a multiple of cycle count {}",
                self.pressure.len(),
                n_prof
            )));
        }
        let profile_len = [
            ("TEMP", self.temperature.len()),
            ("PSAL", self.salinity.len()),
        ];
        for (name, len) in profile_len {
            if len != self.pressure.len() {
                return Err(ArgoError::Ingest(format!(
                    "{} has {} entries, expected {}",
                    name,
                    len,
                    self.pressure.len()
                )));
            }
        }
        Ok(self.pressure.len() / n_prof)
    }
}

/// Ingest every .nc file in `dir`. Returns counters; only a directory-level
/// failure (unreadable dir) is an error.
pub async fn run_ingest(store: &dyn ProfileStore, dir: &Path) -> Result<IngestReport, ArgoError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| ArgoError::Ingest(format!("Failed to read directory {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "nc").unwrap_or(false))
        .collect();
    entries.sort();

    let mut report = IngestReport::default();

    for path in &entries {
        let (file, n_levels) = match read_float_file(path) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Failed to read profile file, skipping");
                report.files_skipped += 1;
                continue;
            }
        };

        tracing::info!(
            file = %path.display(),
            platform_id = %file.platform_id,
            cycles = file.cycle_count(),
            levels = n_levels,
            "Ingesting profile file"
        );

        let (inserted, skipped) = insert_cycles(store, &file, n_levels).await;
        report.rows_inserted += inserted;
        report.cycles_skipped += skipped;
        report.files_processed += 1;
    }

    tracing::info!(
        files = report.files_processed,
        files_skipped = report.files_skipped,
        rows = report.rows_inserted,
        cycles_skipped = report.cycles_skipped,
        "Ingest complete"
    );

    Ok(report)
}

/// Insert one row per usable cycle of an already-decoded file, returning
/// (rows inserted, cycles skipped). Conversion and insert failures are
/// logged and counted, never propagated; nothing stops the same cycles from
/// being inserted again when the file is processed twice.
async fn insert_cycles(store: &dyn ProfileStore, file: &FloatFile, n_levels: usize) -> (u64, u64) {
    let mut inserted = 0u64;
    let mut skipped = 0u64;

    for i in 0..file.cycle_count() {
        let profile = match cycle_to_profile(file, i, n_levels) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(
                    platform_id = %file.platform_id,
                    cycle_index = i,
                    error = %e,
                    "Skipping cycle"
                );
                skipped += 1;
                continue;
            }
        };

        // One commit per cycle: a failed insert rolls back only itself.
        match store.insert_profile(&profile).await {
            Ok(id) => {
                tracing::debug!(
                    id,
                    platform_id = %profile.platform_id,
                    cycle = profile.cycle_number,
                    "Inserted profile row"
                );
                inserted += 1;
            }
            Err(e) => {
                tracing::warn!(
                    platform_id = %profile.platform_id,
                    cycle = profile.cycle_number,
                    error = %e,
                    "Insert failed, skipping cycle"
                );
                skipped += 1;
            }
        }
    }

    (inserted, skipped)
}

/// Open one NetCDF-3 file, decode the variables the ingestor needs, and
/// validate the array shapes. Any failure here aborts only this file.
fn read_float_file(path: &Path) -> Result<(FloatFile, usize), ArgoError> {
    let mut reader = FileReader::open(path)
        .map_err(|e| ArgoError::Ingest(format!("Open failed: {:?}", e)))?;

    let platform_bytes = read_char_var(&mut reader, "PLATFORM_NUMBER")?;
    let cycle_numbers = read_numeric_var(&mut reader, "CYCLE_NUMBER")?;
    let julds = read_numeric_var(&mut reader, "JULD")?;
    let latitudes = read_numeric_var(&mut reader, "LATITUDE")?;
    let longitudes = read_numeric_var(&mut reader, "LONGITUDE")?;
    let pressure = read_numeric_var(&mut reader, "PRES")?;
    let temperature = read_numeric_var(&mut reader, "TEMP")?;
    let salinity = read_numeric_var(&mut reader, "PSAL")?;

    let platform_id = decode_platform_id(&platform_bytes, cycle_numbers.len());
    if platform_id.is_empty() {
        return Err(ArgoError::Ingest("PLATFORM_NUMBER decoded to empty string".to_string()));
    }

    let file = FloatFile {
        platform_id,
        cycle_numbers,
        julds,
        latitudes,
        longitudes,
        pressure,
        temperature,
        salinity,
    };
    let n_levels = file.validate()?;
    Ok((file, n_levels))
}

fn read_char_var(reader: &mut FileReader, name: &str) -> Result<Vec<u8>, ArgoError> {
    match reader.read_var(name) {
        Ok(DataVector::U8(bytes)) => Ok(bytes),
        Ok(DataVector::I8(bytes)) => Ok(bytes.into_iter().map(|b| b as u8).collect()),
        Ok(_) => Err(ArgoError::Ingest(format!("Variable {} is not a char array", name))),
        Err(e) => Err(ArgoError::Ingest(format!("Failed to read {}: {:?}", name, e))),
    }
}

fn read_numeric_var(reader: &mut FileReader, name: &str) -> Result<Vec<f64>, ArgoError> {
    let data = reader
        .read_var(name)
        .map_err(|e| ArgoError::Ingest(format!("Failed to read {}: {:?}", name, e)))?;
    to_f64_vec(data).ok_or_else(|| ArgoError::Ingest(format!("Variable {} is not numeric", name)))
}

/// Widen any numeric NetCDF data vector to f64.
fn to_f64_vec(data: DataVector) -> Option<Vec<f64>> {
    match data {
        DataVector::I8(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::U8(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::I16(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::I32(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::F32(v) => Some(v.into_iter().map(f64::from).collect()),
        DataVector::F64(v) => Some(v),
    }
}

/// Decode the float identifier from the PLATFORM_NUMBER char array.
///
/// The variable is N_PROF fixed-width strings; every profile in a core file
/// belongs to the same float, so the first entry is taken, trimmed of NULs
/// and padding spaces.
fn decode_platform_id(bytes: &[u8], n_prof: usize) -> String {
    let width = if n_prof > 0 && bytes.len() % n_prof == 0 {
        bytes.len() / n_prof
    } else {
        bytes.len()
    };
    let first = &bytes[..width.min(bytes.len())];
    String::from_utf8_lossy(first)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Convert an ARGO JULD (fractional days since 1950-01-01T00:00:00Z) to a
/// timestamp. Fill values and non-finite inputs return None.
fn juld_to_datetime(juld: f64) -> Option<DateTime<Utc>> {
    if !juld.is_finite() || juld < 0.0 || juld >= JULD_FILL_THRESHOLD {
        return None;
    }
    let seconds = (juld * 86_400.0).round() as i64;
    DateTime::from_timestamp(JULD_EPOCH_SECS + seconds, 0)
}

/// Mean of the valid (finite, non-fill) elements of one cycle's profile.
/// Returns None when no element is valid, so the stored scalar ends up NULL
/// rather than a number computed from fill values.
fn profile_mean(values: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values {
        if v.is_finite() && v.abs() < PROFILE_FILL_THRESHOLD {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Build the row for cycle index `i`, or explain why the cycle is unusable.
fn cycle_to_profile(file: &FloatFile, i: usize, n_levels: usize) -> Result<NewProfile, ArgoError> {
    let observed_at = juld_to_datetime(file.julds[i])
        .ok_or_else(|| ArgoError::Ingest(format!("JULD {} is fill or out of range", file.julds[i])))?;

    let cycle = file.cycle_numbers[i];
    if !cycle.is_finite() || cycle < 0.0 || cycle > i32::MAX as f64 {
        return Err(ArgoError::Ingest(format!("Cycle number {} is not a valid integer", cycle)));
    }

    let start = i * n_levels;
    let end = start + n_levels;
    if end > file.pressure.len() || end > file.temperature.len() || end > file.salinity.len() {
        return Err(ArgoError::Ingest("Profile arrays shorter than expected".to_string()));
    }

    Ok(NewProfile {
        platform_id: file.platform_id.clone(),
        cycle_number: cycle.round() as i32,
        observed_at,
        latitude: file.latitudes[i],
        longitude: file.longitudes[i],
        pressure: profile_mean(&file.pressure[start..end]),
        temperature: profile_mean(&file.temperature[start..end]),
        salinity: profile_mean(&file.salinity[start..end]),
    })
}
