//! Sorting dark frames into exposure-time groups.

use std::path::Path;

use tracing::warn;

use crate::frame::Frame;
use crate::pipeline::config::{DarkConfig, DarkGrouping};

/// Dark frames sharing one exposure time.
#[derive(Clone, Debug)]
pub struct DarkGroup {
    pub exptime: f64,
    pub frames: Vec<Frame>,
}

/// Exposure time encoded in a `<prefix>NNN-<exptime><suffix>` file name.
///
/// `dark-004-120s.fit` yields 120 with the default prefix and suffix. The
/// exposure time must be a whole number of seconds.
pub fn exptime_from_name(path: &Path, prefix: &str, suffix: &str) -> Option<f64> {
    let name = path.file_name()?.to_str()?;
    let start = name.find(prefix)? + prefix.len();
    let rest = name[start..].strip_suffix(suffix)?;
    let (sequence, exptime) = rest.rsplit_once('-')?;
    if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    exptime.parse::<u32>().ok().map(f64::from)
}

/// Group dark frames by exposure time, in ascending order.
///
/// Frames whose exposure time cannot be determined are skipped with a warning.
pub fn group_darks(frames: Vec<Frame>, config: &DarkConfig) -> Vec<DarkGroup> {
    let mut groups: Vec<DarkGroup> = Vec::new();
    for frame in frames {
        let exptime = match config.grouping {
            DarkGrouping::FileName => frame
                .metadata
                .source
                .as_deref()
                .and_then(|p| exptime_from_name(p, &config.prefix, &config.suffix)),
            DarkGrouping::Header => frame.exptime(),
        };
        let Some(exptime) = exptime else {
            warn!(frame = %frame.label(), "Skipping dark frame with unknown exposure time");
            continue;
        };
        match groups.iter_mut().find(|g| g.exptime == exptime) {
            Some(group) => group.frames.push(frame),
            None => groups.push(DarkGroup {
                exptime,
                frames: vec![frame],
            }),
        }
    }
    groups.sort_by(|a, b| a.exptime.total_cmp(&b.exptime));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_default_convention() {
        let p = PathBuf::from("/data/night1/dark-004-120s.fit");
        assert_eq!(exptime_from_name(&p, "dark-", "s.fit"), Some(120.0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for name in ["dark-120s.fit", "dark-001-abc.fit", "flat-001-60s.fit", "dark-001-60s.fits"] {
            assert_eq!(
                exptime_from_name(Path::new(name), "dark-", "s.fit"),
                None,
                "{name}"
            );
        }
    }

    #[test]
    fn test_parse_custom_convention() {
        let p = Path::new("night_dk_07-300sec.fits");
        assert_eq!(exptime_from_name(p, "dk_", "sec.fits"), Some(300.0));
    }
}
