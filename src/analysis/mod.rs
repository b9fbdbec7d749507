/// Data analysis for the flood alert service.
///
/// Submodules:
/// - `features` — derives model feature rows from raw sensor readings and
///   completes partial serving requests the same way.
/// - `labels`   — ordered first-match rules assigning a risk label per row.

pub mod features;
pub mod labels;
