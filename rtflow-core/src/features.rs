//! Registry of known RT-DC features and their axis labels.
//!
//! Scalar features hold one value per event. Non-scalar features
//! (images, contours, traces) are tracked by name only.

/// Scalar features with a fixed name.
const SCALAR_FEATURES: &[(&str, &str)] = &[
    ("area_cvx", "Convex area [px]"),
    ("area_msd", "Measured area [px]"),
    ("area_ratio", "Porosity (convex to measured area ratio)"),
    ("area_um", "Area [µm²]"),
    ("aspect", "Aspect ratio of bounding box"),
    ("bright_avg", "Brightness average within contour [a.u.]"),
    ("bright_bc_avg", "Brightness average (bg-corrected) [a.u.]"),
    ("bright_sd", "Brightness SD within contour [a.u.]"),
    ("circ", "Circularity"),
    ("deform", "Deformation"),
    ("emodulus", "Young's Modulus [kPa]"),
    ("frame", "Video frame number"),
    ("index", "Index (Dataset)"),
    ("inert_ratio_cvx", "Inertia ratio of convex contour"),
    ("inert_ratio_prnc", "Principal inertia ratio of raw contour"),
    ("inert_ratio_raw", "Inertia ratio of raw contour"),
    ("nevents", "Total number of events in the same frame"),
    ("pos_x", "Position along channel axis [µm]"),
    ("pos_y", "Position lateral in channel [µm]"),
    ("size_x", "Bounding box size x [µm]"),
    ("size_y", "Bounding box size y [µm]"),
    ("temp", "Chip temperature [°C]"),
    ("temp_amb", "Ambient temperature [°C]"),
    ("tilt", "Absolute tilt of raw contour"),
    ("time", "Event time [s]"),
    ("volume", "Volume [µm³]"),
];

/// Non-scalar features; their data lives outside of the feature table.
const NON_SCALAR_FEATURES: &[(&str, &str)] = &[
    ("contour", "Binary event contour image"),
    ("image", "Gray scale event image"),
    ("image_bg", "Gray scale event background image"),
    ("mask", "Binary region labeling the event in the image"),
    ("trace", "Raw fluorescence traces"),
];

/// Per-channel fluorescence feature suffixes (`fl1_max`, `fl2_width`, ...).
const FLUORESCENCE_SUFFIXES: &[(&str, &str)] = &[
    ("area", "area of peak [a.u.]"),
    ("max", "maximum [a.u.]"),
    ("max_ctc", "maximum, crosstalk-corrected [a.u.]"),
    ("npks", "number of peaks"),
    ("pos", "position of peak [µs]"),
    ("width", "width [µs]"),
];

const FLUORESCENCE_CHANNELS: u8 = 3;
const USER_DEFINED_SLOTS: u8 = 10;

/// Returns true if `name` is a known scalar feature.
pub fn scalar_feature_exists(name: &str) -> bool {
    scalar_label(name).is_some()
}

/// Returns true if `name` is a known scalar or non-scalar feature.
pub fn feature_exists(name: &str) -> bool {
    scalar_feature_exists(name) || NON_SCALAR_FEATURES.iter().any(|(n, _)| *n == name)
}

/// Returns the axis label of a known feature.
pub fn feature_label(name: &str) -> Option<String> {
    scalar_label(name).or_else(|| {
        NON_SCALAR_FEATURES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, label)| (*label).to_string())
    })
}

fn scalar_label(name: &str) -> Option<String> {
    if let Some((_, label)) = SCALAR_FEATURES.iter().find(|(n, _)| *n == name) {
        return Some((*label).to_string());
    }
    fluorescence_label(name)
        .or_else(|| user_defined_label(name))
        .or_else(|| ml_score_label(name))
}

fn fluorescence_label(name: &str) -> Option<String> {
    let rest = name.strip_prefix("fl")?;
    let (channel, suffix) = rest.split_once('_')?;
    let channel: u8 = channel.parse().ok()?;
    if !(1..=FLUORESCENCE_CHANNELS).contains(&channel) {
        return None;
    }
    FLUORESCENCE_SUFFIXES
        .iter()
        .find(|(s, _)| *s == suffix)
        .map(|(_, label)| format!("FL-{channel} {label}"))
}

fn user_defined_label(name: &str) -> Option<String> {
    let slot: u8 = name.strip_prefix("userdef")?.parse().ok()?;
    (slot < USER_DEFINED_SLOTS).then(|| format!("User defined {slot}"))
}

fn ml_score_label(name: &str) -> Option<String> {
    let code = name.strip_prefix("ml_score_")?;
    let valid = code.len() == 3
        && code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    valid.then(|| format!("ML score {}", code.to_ascii_uppercase()))
}
