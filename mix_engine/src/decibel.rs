/// Amplitudes below this are reported as [`FLOOR_DB`].
pub const MIN_AMPLITUDE: f32 = 0.001;

pub const FLOOR_DB: f32 = -120.0;

/// Converts a linear amplitude to decibels full scale.
pub fn linear_to_db(x: f32) -> f32 {
    if x < MIN_AMPLITUDE {
        return FLOOR_DB;
    }

    20.0 * x.log10()
}

pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(0.05 * db)
}
