//! Sensors module.
//!
use anyhow::{anyhow, Result};
use rscam::{Camera, Config, Frame, IntervalInfo, ResolutionInfo};

pub type CaptureFn = Box<dyn Fn() -> Option<Frame>>;

/// Capture settings of a V4L2 camera. Unset values are chosen as the maximum
/// the camera supports.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub device: String,
    pub format: String,
    pub resolution: Option<(u32, u32)>,
    /// Frame interval as `(numerator, denominator)` seconds, e.g. `(1, 30)`.
    pub interval: Option<(u32, u32)>,
}

/// Get a capture function to a video device on a Linux machine.
pub fn get_capture_fn(settings: &CameraSettings) -> Result<CaptureFn> {
    let mut cam = Camera::new(&settings.device)?;
    log_supported_formats(&cam, &settings.format);
    let format = settings.format.as_bytes();

    let resolution = match settings.resolution {
        Some(resolution) => resolution,
        None => get_max_resolution(&cam, format)?,
    };
    let interval = match settings.interval {
        Some(interval) => interval,
        None => get_fastest_interval(&cam, format, resolution)?,
    };

    log::info!(
        "Using camera {} at {}x{}, interval {}/{}s",
        &settings.device,
        resolution.0,
        resolution.1,
        interval.0,
        interval.1
    );

    cam.start(&Config {
        interval,
        resolution,
        format,
        ..Default::default()
    })?;

    let callback = move || cam.capture().ok();
    Ok(Box::new(callback))
}

/// Resolution with the most pixels.
fn largest_resolution(resolutions: &[(u32, u32)]) -> Option<(u32, u32)> {
    resolutions
        .iter()
        .max_by_key(|(width, height)| u64::from(*width) * u64::from(*height))
        .copied()
}

/// Shortest frame interval, i.e. the highest frame rate.
fn shortest_interval(intervals: &[(u32, u32)]) -> Option<(u32, u32)> {
    intervals
        .iter()
        .filter(|(_, denominator)| *denominator > 0)
        // n_a/d_a < n_b/d_b  <=>  n_a*d_b < n_b*d_a
        .min_by(|a, b| (u64::from(a.0) * u64::from(b.1)).cmp(&(u64::from(b.0) * u64::from(a.1))))
        .copied()
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        ResolutionInfo::Discretes(resolutions) => largest_resolution(&resolutions),
        ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| anyhow!("No resolution found"))
}

/// Get the shortest supported frame interval for the given format and resolution.
fn get_fastest_interval(cam: &Camera, format: &[u8], resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        IntervalInfo::Discretes(intervals) => shortest_interval(&intervals),
        IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| anyhow!("No frame interval found"))
}

fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
