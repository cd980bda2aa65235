use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::consts::SPECTRUM_COLUMNS;
use crate::error::{ReduxError, Result};
use crate::spectrum::Spectrum;

/// Write one spectrum as six tab-separated columns:
/// wavelength, raw, rms, rectified, calibration source, snr.
pub fn write_spectrum(spectrum: &Spectrum, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", SPECTRUM_COLUMNS.join("\t"))?;
    for i in 0..spectrum.len() {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            spectrum.wv[i],
            spectrum.raw[i],
            spectrum.rms[i],
            spectrum.rectified[i],
            spectrum.waves[i],
            spectrum.snr[i]
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write each spectrum to `<dir>/<name>.txt`, returning the paths written.
///
/// A name already used in this batch gets a `-2`, `-3`, ... suffix so no
/// spectrum overwrites another.
pub fn write_spectra(spectra: &[Spectrum], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut used: HashSet<String> = HashSet::new();
    spectra
        .iter()
        .map(|s| {
            let stem = unique_stem(&s.name, &mut used);
            if stem != s.name {
                warn!(
                    name = %s.name,
                    file = %stem,
                    "Duplicate spectrum name; writing under a suffixed file name"
                );
            }
            let path = dir.join(format!("{stem}.txt"));
            write_spectrum(s, &path)?;
            Ok(path)
        })
        .collect()
}

fn unique_stem(name: &str, used: &mut HashSet<String>) -> String {
    let mut stem = name.to_string();
    let mut n = 2;
    while used.contains(&stem) {
        stem = format!("{name}-{n}");
        n += 1;
    }
    used.insert(stem.clone());
    stem
}

/// Read a spectrum written by [`write_spectrum`]. The name is the file stem.
pub fn read_spectrum(path: &Path) -> Result<Spectrum> {
    if !path.exists() {
        return Err(ReduxError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reader = BufReader::new(File::open(path)?);

    let mut columns: [Vec<f64>; 6] = Default::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != SPECTRUM_COLUMNS.len() {
            return Err(ReduxError::Parse(format!(
                "{}:{}: expected {} columns, found {}",
                path.display(),
                line_no + 1,
                SPECTRUM_COLUMNS.len(),
                fields.len()
            )));
        }
        let parsed: std::result::Result<Vec<f64>, _> =
            fields.iter().map(|f| f.parse::<f64>()).collect();
        match parsed {
            Ok(values) => {
                for (col, v) in columns.iter_mut().zip(values) {
                    col.push(v);
                }
            }
            // Column-name row.
            Err(_) if line_no == 0 => continue,
            Err(e) => {
                return Err(ReduxError::Parse(format!(
                    "{}:{}: {e}",
                    path.display(),
                    line_no + 1
                )))
            }
        }
    }

    let [wv, raw, rms, rectified, waves, snr] = columns;
    let mut spectrum = Spectrum::new(name, rms.len());
    spectrum.wv = wv;
    spectrum.raw = raw;
    spectrum.rms = rms;
    spectrum.rectified = rectified;
    spectrum.waves = waves;
    spectrum.snr = snr;
    spectrum.provenance.source = Some(path.to_path_buf());
    Ok(spectrum)
}

/// Read object names, one per line, skipping blank lines.
pub fn read_names(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(ReduxError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}
