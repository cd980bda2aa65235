/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum number of source frames to extract on the Rayon pool.
pub const PARALLEL_FRAME_THRESHOLD: usize = 2;

/// Default extraction half-width, in units of the trace sigma.
pub const DEFAULT_EXTRACTION_FACTOR: f64 = 2.0;

/// Default width (pixels) of each flanking sky window.
pub const DEFAULT_SKY_WINDOW: usize = 50;

/// Default gap (pixels) between the aperture and each sky window.
pub const DEFAULT_SKY_GAP: usize = 10;

/// Digitization noise of one ADU: 1/sqrt(12).
pub const DIGITIZATION_NOISE: f64 = 0.289;

/// Size of the square median filter applied before collapsing the trace.
pub const TRACE_MEDIAN_FILTER_SIZE: usize = 5;

/// Trace width used whenever the Gaussian fit is skipped or rejected.
pub const FALLBACK_TRACE_WIDTH: f64 = 3.0;

/// A fitted trace center this far (pixels) from the profile maximum is rejected.
pub const TRACE_DIVERGENCE_LIMIT: f64 = 5.0;

/// Initial Gaussian amplitude for the trace fit.
pub const TRACE_INITIAL_AMPLITUDE: f64 = 1000.0;

/// Initial continuum offset for the trace fit.
pub const TRACE_INITIAL_OFFSET: f64 = 1.0;

/// Minimum number of reference lines for a quadratic dispersion solution.
pub const QUADRATIC_MIN_POINTS: usize = 4;

/// Minimum number of reference lines for any dispersion solution.
pub const MIN_REFERENCE_POINTS: usize = 2;

/// Half-width (pixels) of the search window when snapping a picked line.
pub const LINE_SNAP_BUFFER: usize = 5;

/// Gain assumed when the calibration set is too small for Howell's method.
pub const DEFAULT_DETECTOR_GAIN: f64 = 1.0;

/// Read noise assumed when the calibration set is too small for Howell's method.
pub const DEFAULT_DETECTOR_READ_NOISE: f64 = 0.0;

/// Header keyword carrying the exposure time in seconds.
pub const EXPTIME_KEY: &str = "EXPTIME";

/// Column names written at the top of every spectrum text file.
pub const SPECTRUM_COLUMNS: [&str; 6] = ["wv", "raw", "rms", "rect", "wvcal", "snr"];

/// Default width (wavelength units) of the window sampled around each continuum anchor.
pub const DEFAULT_CONTINUUM_WINDOW: f64 = 10.0;
